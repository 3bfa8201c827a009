//! Cooperative scheduler that defers continuations to a later tick.
//!
//! Every promise continuation and every poll of a spawned task goes through
//! a single job queue drained by [`Executor`].
//! Nothing is ever run inline from the place that triggered it.

use {
    crate::{
        error::{Error, LoadError},
        promise::{Deferred, Promise},
    },
    futures::{
        future::{BoxFuture, Either},
        task::{waker_ref, ArcWake},
    },
    parking_lot::Mutex,
    std::{
        future::Future,
        sync::Arc,
        task::{Context, Poll},
    },
    tracing::Instrument as _,
};

pub(crate) enum Job {
    Call(Box<dyn FnOnce() + Send>),
    Poll(Arc<Task>),
}

impl Job {
    fn run(self) {
        match self {
            Job::Call(f) => f(),
            Job::Poll(task) => task.poll(),
        }
    }
}

/// Sending half of the job queue.
#[derive(Clone)]
pub(crate) struct Queue {
    tx: flume::Sender<Job>,
}

impl Queue {
    pub(crate) fn call(&self, f: impl FnOnce() + Send + 'static) {
        self.push(Job::Call(Box::new(f)));
    }

    fn push(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::trace!("Executor is gone, job discarded");
        }
    }
}

pub(crate) struct Task {
    // Lock is held for the duration of a poll so a wake-up
    // issued mid-poll is processed by the next queued poll.
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    queue: Queue,
}

impl Task {
    fn poll(self: &Arc<Self>) {
        let mut slot = self.future.lock();
        if let Some(future) = slot.as_mut() {
            let waker = waker_ref(self);
            let mut cx = Context::from_waker(&waker);
            if let Poll::Ready(()) = future.as_mut().poll(&mut cx) {
                *slot = None;
            }
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.queue.push(Job::Poll(arc_self.clone()));
    }
}

struct Singletons {
    fulfilled: Promise<()>,
    rejected: Promise<()>,
    never: Promise<()>,
}

/// Task spawner.
///
/// Cheap to clone. All promises created through a spawner
/// dispatch their continuations to the executor it came from.
#[derive(Clone)]
pub struct Spawner {
    queue: Queue,
    singletons: Arc<Singletons>,
}

impl Spawner {
    /// Spawns a task onto the executor.
    /// The task is first polled on a later tick, never inside this call.
    pub fn spawn<Fut>(&self, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = Arc::new(Task {
            future: Mutex::new(Some(Box::pin(fut.in_current_span()))),
            queue: self.queue.clone(),
        });
        self.queue.push(Job::Poll(task));
    }

    /// Schedules `f` to run on a later tick.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        self.queue.call(f);
    }

    /// Returns a fresh unresolved [`Deferred`].
    pub fn deferred<T>(&self) -> Deferred<T>
    where
        T: Clone + Send + 'static,
    {
        Deferred::new(self)
    }

    /// Already fulfilled promise.
    pub fn fulfilled(&self) -> Promise<()> {
        self.singletons.fulfilled.clone()
    }

    /// Already rejected promise. The reason is [`LoadError::Unspecified`].
    pub fn rejected(&self) -> Promise<()> {
        self.singletons.rejected.clone()
    }

    /// Promise that never settles.
    pub fn never(&self) -> Promise<()> {
        self.singletons.never.clone()
    }

    pub(crate) fn queue(&self) -> &Queue {
        &self.queue
    }
}

/// Drains the job queue.
pub struct Executor {
    rx: flume::Receiver<Job>,
    spawner: Spawner,
}

impl Default for Executor {
    fn default() -> Self {
        Executor::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        let queue = Queue { tx };
        let singletons = Arc::new(Singletons {
            fulfilled: Promise::settled(&queue, Ok(())),
            rejected: Promise::settled(&queue, Err(LoadError::Unspecified.into())),
            never: Promise::never(&queue),
        });

        Executor {
            rx,
            spawner: Spawner { queue, singletons },
        }
    }

    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    /// Runs single queued job.
    /// Returns `false` if queue was empty.
    pub fn run_once(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(job) => {
                job.run();
                true
            }
            Err(_) => false,
        }
    }

    /// Runs jobs until queue is empty, including jobs queued by jobs.
    /// Returns number of jobs executed.
    pub fn run_until_stalled(&mut self) -> usize {
        let mut count = 0;
        while self.run_once() {
            count += 1;
        }
        count
    }

    /// Runs jobs until `promise` settles.
    ///
    /// When queue is empty this waits for new jobs,
    /// so deferreds resolved from other threads make progress.
    /// Never returns if `promise` never settles.
    pub async fn run_until<T>(&mut self, promise: Promise<T>) -> Result<T, Error>
    where
        T: Clone + Send + 'static,
    {
        let mut promise = promise;
        loop {
            self.run_until_stalled();
            if let Some(result) = promise.peek() {
                return result;
            }

            let job = {
                let recv = self.rx.recv_async();
                futures::pin_mut!(recv);
                match futures::future::select(recv, &mut promise).await {
                    Either::Left((Ok(job), _)) => job,
                    Either::Left((Err(_), _)) => return Err(LoadError::Disconnected.into()),
                    Either::Right((result, _)) => return result,
                }
            };
            job.run();
        }
    }

    /// Blocks current thread running jobs until `promise` settles.
    pub fn block_on<T>(&mut self, promise: Promise<T>) -> Result<T, Error>
    where
        T: Clone + Send + 'static,
    {
        futures::executor::block_on(self.run_until(promise))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn defer_runs_on_later_tick() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        spawner.defer(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(executor.run_until_stalled(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spawned_task_is_woken_by_promise() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let deferred = spawner.deferred::<u32>();
        let seen = Arc::new(AtomicUsize::new(0));

        let promise = deferred.promise();
        let s = seen.clone();
        spawner.spawn(async move {
            if let Ok(value) = promise.await {
                s.store(value as usize, Ordering::SeqCst);
            }
        });

        executor.run_until_stalled();
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        deferred.resolve(7);
        executor.run_until_stalled();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn block_on_waits_for_other_threads() {
        let mut executor = Executor::new();
        let deferred = executor.spawner().deferred::<&'static str>();

        let remote = deferred.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            remote.resolve("done");
        });

        assert_eq!(executor.block_on(deferred.promise()).unwrap(), "done");
        handle.join().unwrap();
    }

    #[test]
    fn singletons_are_settled() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();

        assert!(executor.block_on(spawner.fulfilled()).is_ok());
        let err = executor.block_on(spawner.rejected()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::Unspecified)
        ));
        assert!(spawner.never().peek().is_none());
    }
}
