use {
    crate::{promise::Promise, task::Spawner},
    std::sync::Arc,
};

/// Predicate confirming that a load really happened.
pub type Verify = Arc<dyn Fn() -> bool + Send + Sync>;

/// How a location should be fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchMode {
    /// Load and apply the resource.
    Execute,

    /// Only warm up host cache for the location. Resource is not applied.
    Cache,
}

/// Host capability that physically fetches resources.
pub trait Source: Send + Sync + 'static {
    /// Attempts to load single location.
    ///
    /// Returned promise is fulfilled when resource is loaded
    /// and rejected with host-specific error otherwise.
    /// Hosts unable to report load failures natively should call `verify`
    /// after an apparently successful [`FetchMode::Execute`] fetch
    /// and reject if it returns `false`.
    fn fetch(
        &self,
        spawner: &Spawner,
        location: &str,
        verify: Option<&Verify>,
        mode: FetchMode,
    ) -> Promise<()>;
}

impl<S> Source for Arc<S>
where
    S: Source + ?Sized,
{
    fn fetch(
        &self,
        spawner: &Spawner,
        location: &str,
        verify: Option<&Verify>,
        mode: FetchMode,
    ) -> Promise<()> {
        (**self).fetch(spawner, location, verify, mode)
    }
}

/// Host capabilities that decide when and how loads are issued.
pub trait Environment: Send + Sync + 'static {
    /// Fulfilled once host is ready for loads to be issued.
    fn ready(&self, spawner: &Spawner) -> Promise<()>;

    /// Whether loads issued concurrently are applied in issue order.
    fn preserves_order(&self) -> bool;
}

/// Host that is always ready and keeps order of concurrent loads.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderedHost;

impl Environment for OrderedHost {
    fn ready(&self, spawner: &Spawner) -> Promise<()> {
        spawner.fulfilled()
    }

    fn preserves_order(&self) -> bool {
        true
    }
}
