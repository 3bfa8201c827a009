use {
    super::source::Verify,
    crate::promise::{Deferred, Promise},
};

/// Key of a record in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId(pub(crate) usize);

/// Load state of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

impl AssetState {
    pub fn is_settled(&self) -> bool {
        matches!(self, AssetState::Loaded | AssetState::Failed)
    }
}

/// Snapshot of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetStatus {
    pub name: Box<str>,
    pub sources: Vec<Box<str>>,
    pub state: AssetState,

    /// Location that was loaded successfully.
    pub location: Option<Box<str>>,

    /// Name of the record this one aliases.
    pub alias_of: Option<Box<str>>,
}

/// Unit of loadable work.
pub(crate) struct Asset {
    pub name: Box<str>,
    pub sources: Vec<Box<str>>,
    pub verify: Option<Verify>,
    pub state: AssetState,
    pub location: Option<Box<str>>,
    pub deferred: Deferred<()>,

    /// Record that performs the actual load for this one.
    pub canonical: Option<AssetId>,
}

impl Asset {
    pub fn new(
        name: Box<str>,
        sources: Vec<Box<str>>,
        verify: Option<Verify>,
        deferred: Deferred<()>,
    ) -> Self {
        Asset {
            name,
            sources,
            verify,
            state: AssetState::Unloaded,
            location: None,
            deferred,
            canonical: None,
        }
    }

    pub fn promise(&self) -> Promise<()> {
        self.deferred.promise()
    }

    /// Sourceless record that is not an alias. It never loads.
    pub fn is_inert(&self) -> bool {
        self.sources.is_empty() && self.canonical.is_none()
    }
}
