//! Resolve-once values with chained continuations.
//!
//! [`Deferred`] is the producer side able to settle the value.
//! [`Promise`] is read-only view handed to consumers.
//! Continuations are always dispatched through the [`Spawner`]
//! job queue and never run inside the call that registered or triggered them.

mod combinators;

pub use self::combinators::{all_of, all_settled, delay, race};

use {
    crate::{
        error::Error,
        task::{Queue, Spawner},
    },
    parking_lot::Mutex,
    std::{
        fmt::{self, Debug},
        future::Future,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll, Waker},
    },
};

type Callback<V> = Box<dyn FnOnce(V) + Send>;

enum State<T> {
    Pending {
        fulfilled: Vec<Callback<T>>,
        rejected: Vec<Callback<Error>>,
        wakers: Vec<Waker>,
    },
    Fulfilled(T),
    Rejected(Error),
    /// Never settles. Continuations are dropped on registration.
    Never,
}

/// Observable state of a promise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// What a continuation handler produced.
///
/// Handlers return `Result<Next<T>, Error>`,
/// where `Err` rejects the chained promise.
pub enum Next<T> {
    /// Fulfil chained promise with the value.
    Value(T),

    /// Chained promise adopts eventual outcome of another one.
    Adopt(Promise<T>),
}

impl<T> Next<T> {
    pub fn adopt(observable: &impl Observable<T>) -> Self {
        Next::Adopt(observable.promise())
    }
}

/// Anything that can hand out a [`Promise`] of its completion.
pub trait Observable<T> {
    fn promise(&self) -> Promise<T>;
}

/// Read-only view of eventually available value or failure.
///
/// Also implements [`Future`], resolving into `Result<T, Error>`.
pub struct Promise<T> {
    state: Arc<Mutex<State<T>>>,
    queue: Queue,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            state: self.state.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<T> Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            State::Pending { .. } | State::Never => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

impl<T> Observable<T> for Promise<T> {
    fn promise(&self) -> Promise<T> {
        self.clone()
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    fn with_state(queue: &Queue, state: State<T>) -> Self {
        Promise {
            state: Arc::new(Mutex::new(state)),
            queue: queue.clone(),
        }
    }

    fn pending(queue: &Queue) -> Self {
        Promise::with_state(
            queue,
            State::Pending {
                fulfilled: Vec::new(),
                rejected: Vec::new(),
                wakers: Vec::new(),
            },
        )
    }

    pub(crate) fn settled(queue: &Queue, result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Promise::with_state(queue, State::Fulfilled(value)),
            Err(err) => Promise::with_state(queue, State::Rejected(err)),
        }
    }

    pub(crate) fn never(queue: &Queue) -> Self {
        Promise::with_state(queue, State::Never)
    }

    /// Returns already settled promise.
    pub fn from_result(spawner: &Spawner, result: Result<T, Error>) -> Self {
        Promise::settled(spawner.queue(), result)
    }

    pub fn state(&self) -> PromiseState {
        match &*self.state.lock() {
            State::Pending { .. } | State::Never => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }

    /// Returns outcome if already settled.
    pub fn peek(&self) -> Option<Result<T, Error>> {
        match &*self.state.lock() {
            State::Pending { .. } | State::Never => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(err) => Some(Err(err.clone())),
        }
    }

    /// Returns `true` if both promises are views of the same value.
    pub fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Registers raw continuations. Exactly one of them eventually runs,
    /// on a later tick, unless the promise never settles.
    fn subscribe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(Error) + Send + 'static,
    {
        let mut state = self.state.lock();
        match &mut *state {
            State::Pending {
                fulfilled,
                rejected,
                ..
            } => {
                fulfilled.push(Box::new(on_fulfilled));
                rejected.push(Box::new(on_rejected));
            }
            State::Fulfilled(value) => {
                let value = value.clone();
                drop(state);
                self.queue.call(move || on_fulfilled(value));
            }
            State::Rejected(err) => {
                let err = err.clone();
                drop(state);
                self.queue.call(move || on_rejected(err));
            }
            State::Never => {}
        }
    }

    /// Transitions pending promise. Returns `false` if it was already settled.
    fn settle(&self, result: Result<T, Error>) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, State::Pending { .. }) {
            return false;
        }

        let settled = match &result {
            Ok(value) => State::Fulfilled(value.clone()),
            Err(err) => State::Rejected(err.clone()),
        };

        // The losing queue is dropped here.
        let old = std::mem::replace(&mut *state, settled);
        drop(state);

        if let State::Pending {
            fulfilled,
            rejected,
            wakers,
        } = old
        {
            match result {
                Ok(value) => {
                    for f in fulfilled {
                        let value = value.clone();
                        self.queue.call(move || f(value));
                    }
                }
                Err(err) => {
                    for f in rejected {
                        let err = err.clone();
                        self.queue.call(move || f(err));
                    }
                }
            }
            for waker in wakers {
                waker.wake();
            }
        }
        true
    }

    /// Registers continuations and returns chained promise.
    ///
    /// Missing handler passes value or reason through unchanged.
    /// If both handlers are missing `self` is returned.
    pub fn observe<F, R>(&self, on_fulfilled: Option<F>, on_rejected: Option<R>) -> Promise<T>
    where
        F: FnOnce(T) -> Result<Next<T>, Error> + Send + 'static,
        R: FnOnce(Error) -> Result<Next<T>, Error> + Send + 'static,
    {
        if on_fulfilled.is_none() && on_rejected.is_none() {
            return self.clone();
        }

        let next = Deferred::from_queue(&self.queue);
        let (a, b) = (next.clone(), next.clone());
        self.subscribe(
            move |value| match on_fulfilled {
                Some(f) => a.settle_with(f(value)),
                None => a.resolve(value),
            },
            move |err| match on_rejected {
                Some(r) => b.settle_with(r(err)),
                None => b.reject(err),
            },
        );
        next.promise()
    }

    /// Chains fulfilment handler. Rejection passes through.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Next<U>, Error> + Send + 'static,
    {
        let next = Deferred::from_queue(&self.queue);
        let (a, b) = (next.clone(), next.clone());
        self.subscribe(
            move |value| a.settle_with(on_fulfilled(value)),
            move |err| b.reject(err),
        );
        next.promise()
    }

    /// Chains rejection handler. Value passes through.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T>
    where
        R: FnOnce(Error) -> Result<Next<T>, Error> + Send + 'static,
    {
        self.observe(None::<fn(T) -> Result<Next<T>, Error>>, Some(on_rejected))
    }

    /// Runs `f` with the outcome once settled.
    pub fn on_settled<F>(&self, f: F)
    where
        F: FnOnce(Result<T, Error>) + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(f)));
        let other = slot.clone();
        self.subscribe(
            move |value| {
                let f = slot.lock().take();
                if let Some(f) = f {
                    f(Ok(value));
                }
            },
            move |err| {
                let f = other.lock().take();
                if let Some(f) = f {
                    f(Err(err));
                }
            },
        );
    }

    /// Runs `f` with the value if promise is fulfilled.
    pub fn on_fulfilled<F>(&self, f: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.subscribe(f, |_| {});
    }
}

impl<T> Future for Promise<T>
where
    T: Clone + Send + 'static,
{
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T, Error>> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
            State::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(err) => Poll::Ready(Err(err.clone())),
            State::Never => Poll::Pending,
        }
    }
}

/// Producer side of a [`Promise`].
pub struct Deferred<T> {
    promise: Promise<T>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Deferred {
            promise: self.promise.clone(),
        }
    }
}

impl<T> Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Deferred").field(&self.promise).finish()
    }
}

impl<T> Observable<T> for Deferred<T> {
    fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }
}

impl<T> Deferred<T> {
    /// Returns read-only view that cannot settle the value.
    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }
}

impl<T> Deferred<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(spawner: &Spawner) -> Self {
        Deferred::from_queue(spawner.queue())
    }

    pub(crate) fn from_queue(queue: &Queue) -> Self {
        Deferred {
            promise: Promise::pending(queue),
        }
    }

    /// Fulfils the promise. No-op if already settled.
    pub fn resolve(&self, value: T) {
        self.promise.settle(Ok(value));
    }

    /// Rejects the promise. No-op if already settled.
    pub fn reject(&self, reason: Error) {
        self.promise.settle(Err(reason));
    }

    /// Settles the promise with `result`.
    /// Returns `false` if it was settled before.
    pub fn settle(&self, result: Result<T, Error>) -> bool {
        self.promise.settle(result)
    }

    /// Settles according to handler output, adopting another promise if asked to.
    pub fn settle_with(&self, outcome: Result<Next<T>, Error>) {
        match outcome {
            Ok(Next::Value(value)) => self.resolve(value),
            Ok(Next::Adopt(other)) => {
                let (a, b) = (self.clone(), self.clone());
                other.subscribe(move |value| a.resolve(value), move |err| b.reject(err));
            }
            Err(err) => self.reject(err),
        }
    }

    pub fn state(&self) -> PromiseState {
        self.promise.state()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::LoadError, task::Executor},
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn failure(location: &str) -> Error {
        LoadError::NotFound {
            location: location.into(),
        }
        .into()
    }

    #[test]
    fn settles_exactly_once() {
        let mut executor = Executor::new();
        let deferred = executor.spawner().deferred::<u32>();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        deferred.promise().on_fulfilled(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(deferred.settle(Ok(1)));
        assert!(!deferred.settle(Ok(2)));
        deferred.reject(failure("late"));
        executor.run_until_stalled();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(deferred.state(), PromiseState::Fulfilled);
        assert_eq!(deferred.promise().peek().unwrap().unwrap(), 1);
    }

    #[test]
    fn continuations_never_run_synchronously() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let promise = Promise::from_result(&spawner, Ok(5u32));
        let seen = Arc::new(AtomicUsize::new(0));

        let s = seen.clone();
        promise.on_fulfilled(move |v| {
            s.store(v as usize, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        executor.run_until_stalled();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn observe_without_handlers_returns_self() {
        let executor = Executor::new();
        let promise = executor.spawner().deferred::<u32>().promise();
        let same = promise.observe(
            None::<fn(u32) -> Result<Next<u32>, Error>>,
            None::<fn(Error) -> Result<Next<u32>, Error>>,
        );
        assert!(same.ptr_eq(&promise));
    }

    #[test]
    fn missing_handlers_pass_through() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();

        let ok = Promise::from_result(&spawner, Ok(3u32)).catch(|_| Ok(Next::Value(0)));
        assert_eq!(executor.block_on(ok).unwrap(), 3);

        let reason = failure("a.js");
        let err = Promise::<u32>::from_result(&spawner, Err(reason.clone()))
            .then(|v| Ok(Next::Value(v + 1)));
        assert!(executor.block_on(err).unwrap_err().ptr_eq(&reason));
    }

    #[test]
    fn rejection_handler_value_fulfils() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();

        let recovered =
            Promise::<u32>::from_result(&spawner, Err(failure("x"))).catch(|_| Ok(Next::Value(9)));
        assert_eq!(executor.block_on(recovered).unwrap(), 9);
    }

    #[test]
    fn handler_error_rejects_chain() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();

        let chained = Promise::from_result(&spawner, Ok(1u32))
            .then(|_| Err::<Next<u32>, _>(failure("thrown")));
        let err = executor.block_on(chained).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::NotFound { location }) if &**location == "thrown"
        ));
    }

    #[test]
    fn adopted_promise_is_flattened() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let inner = spawner.deferred::<&'static str>();

        let adopted = inner.clone();
        let chained =
            Promise::from_result(&spawner, Ok(())).then(move |()| Ok(Next::adopt(&adopted)));

        executor.run_until_stalled();
        assert_eq!(chained.state(), PromiseState::Pending);

        inner.resolve("inner");
        assert_eq!(executor.block_on(chained).unwrap(), "inner");
    }

    #[test]
    fn only_matching_queue_runs() {
        let mut executor = Executor::new();
        let deferred = executor.spawner().deferred::<()>();
        let fulfilled = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));

        let (f, r) = (fulfilled.clone(), rejected.clone());
        deferred.promise().on_settled(move |result| match result {
            Ok(()) => {
                f.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                r.fetch_add(1, Ordering::SeqCst);
            }
        });

        deferred.reject(failure("gone"));
        executor.run_until_stalled();
        assert_eq!(fulfilled.load(Ordering::SeqCst), 0);
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn never_drops_continuations() {
        let mut executor = Executor::new();
        let never = executor.spawner().never();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        never.on_settled(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        executor.run_until_stalled();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(never.state(), PromiseState::Pending);
    }
}
