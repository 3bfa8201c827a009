use {
    super::{Deferred, Promise},
    crate::task::Spawner,
    std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    },
};

/// Fulfils when every promise fulfils.
/// Rejects with the first rejection without waiting for the rest.
///
/// Empty input yields already fulfilled promise
/// and single input is returned as is.
pub fn all_of<I>(spawner: &Spawner, promises: I) -> Promise<()>
where
    I: IntoIterator<Item = Promise<()>>,
{
    let mut promises: Vec<_> = promises.into_iter().collect();

    match promises.len() {
        0 => spawner.fulfilled(),
        1 => promises.swap_remove(0),
        count => {
            let all = Deferred::new(spawner);
            let pending = Arc::new(AtomicUsize::new(count));

            for promise in promises {
                let (a, b) = (all.clone(), all.clone());
                let pending = pending.clone();
                promise.subscribe(
                    move |()| {
                        if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                            a.resolve(());
                        }
                    },
                    move |err| b.reject(err),
                );
            }

            all.promise
        }
    }
}

/// Fulfils once every promise settled, whatever the outcome.
pub fn all_settled<T, I>(spawner: &Spawner, promises: I) -> Promise<()>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<_> = promises.into_iter().collect();
    if promises.is_empty() {
        return spawner.fulfilled();
    }

    let all = Deferred::new(spawner);
    let pending = Arc::new(AtomicUsize::new(promises.len()));

    for promise in promises {
        let all = all.clone();
        let pending = pending.clone();
        promise.on_settled(move |_| {
            if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                all.resolve(());
            }
        });
    }

    all.promise
}

/// Settles like the first of `promises` to settle.
/// Empty input never settles.
pub fn race<T, I>(spawner: &Spawner, promises: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let first = Deferred::new(spawner);
    let mut any = false;

    for promise in promises {
        any = true;
        let (a, b) = (first.clone(), first.clone());
        promise.subscribe(move |value| a.resolve(value), move |err| b.reject(err));
    }

    if any {
        first.promise
    } else {
        Promise::never(spawner.queue())
    }
}

/// Promise fulfilled after `duration`.
///
/// Timer runs on the ambient tokio runtime.
/// Without one the delay never elapses.
pub fn delay(spawner: &Spawner, duration: Duration) -> Promise<()> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let deferred = Deferred::new(spawner);
            let timer = deferred.clone();
            handle.spawn(async move {
                tokio::time::sleep(duration).await;
                timer.resolve(());
            });
            deferred.promise
        }
        Err(_) => {
            tracing::warn!("No tokio runtime, delay of {:?} never elapses", duration);
            spawner.never()
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::{Error, LoadError},
            promise::PromiseState,
            task::Executor,
        },
    };

    fn failure() -> Error {
        LoadError::Unspecified.into()
    }

    #[test]
    fn all_of_empty_is_fulfilled() {
        let executor = Executor::new();
        let spawner = executor.spawner();
        let all = all_of(&spawner, Vec::new());
        assert!(all.ptr_eq(&spawner.fulfilled()));
    }

    #[test]
    fn all_of_single_is_identity() {
        let executor = Executor::new();
        let spawner = executor.spawner();
        let only = spawner.deferred::<()>().promise();
        assert!(all_of(&spawner, vec![only.clone()]).ptr_eq(&only));
    }

    #[test]
    fn all_of_rejects_without_waiting() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let slow = spawner.deferred::<()>();
        let fast = spawner.deferred::<()>();

        let all = all_of(&spawner, vec![slow.promise(), fast.promise()]);
        let reason = failure();
        fast.reject(reason.clone());
        executor.run_until_stalled();

        assert_eq!(slow.state(), PromiseState::Pending);
        assert!(all.peek().unwrap().unwrap_err().ptr_eq(&reason));
    }

    #[test]
    fn all_of_fulfils_after_last() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let parts: Vec<_> = (0..3).map(|_| spawner.deferred::<()>()).collect();

        let all = all_of(&spawner, parts.iter().map(|d| d.promise()));
        parts[0].resolve(());
        parts[2].resolve(());
        executor.run_until_stalled();
        assert_eq!(all.state(), PromiseState::Pending);

        parts[1].resolve(());
        executor.run_until_stalled();
        assert_eq!(all.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn all_settled_ignores_outcomes() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let a = spawner.deferred::<()>();
        let b = spawner.deferred::<()>();

        let all = all_settled(&spawner, vec![a.promise(), b.promise()]);
        a.reject(failure());
        executor.run_until_stalled();
        assert_eq!(all.state(), PromiseState::Pending);

        b.resolve(());
        executor.run_until_stalled();
        assert_eq!(all.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn race_takes_first() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let a = spawner.deferred::<u32>();
        let b = spawner.deferred::<u32>();

        let first = race(&spawner, vec![a.promise(), b.promise()]);
        b.resolve(2);
        a.resolve(1);
        assert_eq!(executor.block_on(first).unwrap(), 2);
    }

    #[test]
    fn race_of_nothing_never_settles() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let none = race::<u32, _>(&spawner, Vec::new());
        executor.run_until_stalled();
        assert!(none.peek().is_none());
    }

    #[tokio::test]
    async fn delay_elapses_on_tokio() {
        let mut executor = Executor::new();
        let spawner = executor.spawner();
        let timer = delay(&spawner, Duration::from_millis(5));
        executor.run_until(timer).await.unwrap();
    }

    #[test]
    fn delay_without_runtime_never_elapses() {
        let executor = Executor::new();
        let spawner = executor.spawner();
        assert!(delay(&spawner, Duration::from_millis(1)).ptr_eq(&spawner.never()));
    }
}
