use {
    super::{
        asset::{Asset, AssetId, AssetState, AssetStatus},
        key::Descriptor,
        source::Verify,
    },
    crate::{
        error::{Error, LoadError},
        promise::{Deferred, Promise},
        task::Spawner,
    },
    ahash::RandomState,
    hashbrown::HashMap,
    parking_lot::Mutex,
    slab::Slab,
    std::sync::{Arc, Weak},
};

struct Table {
    assets: Slab<Asset>,
    names: HashMap<Box<str>, AssetId, RandomState>,

    /// Location to the canonical record that first claimed it.
    locations: HashMap<Box<str>, AssetId, RandomState>,
}

impl Table {
    fn get(&self, id: AssetId) -> &Asset {
        &self.assets[id.0]
    }

    fn get_mut(&mut self, id: AssetId) -> &mut Asset {
        &mut self.assets[id.0]
    }

    fn canonical_of(&self, id: AssetId) -> AssetId {
        self.get(id).canonical.unwrap_or(id)
    }

    /// Earliest registered record owning any of `sources`.
    fn owner_of(&self, sources: &[Box<str>]) -> Option<AssetId> {
        sources
            .iter()
            .filter_map(|source| self.locations.get(source).copied())
            .min()
    }

    fn insert(&mut self, asset: Asset) -> AssetId {
        let name = asset.name.clone();
        let id = AssetId(self.assets.insert(asset));
        self.names.insert(name, id);
        id
    }

    /// Claims unclaimed locations of the record for its canonical record.
    fn index(&mut self, id: AssetId) {
        let canonical = self.canonical_of(id);
        let Table {
            assets, locations, ..
        } = self;
        for source in &assets[id.0].sources {
            locations.entry(source.clone()).or_insert(canonical);
        }
    }

    fn status(&self, id: AssetId) -> AssetStatus {
        let asset = self.get(id);
        let alias_of = asset.canonical.map(|canonical| self.get(canonical));

        // Aliases copy terminal state when canonical record settles.
        // Until then they report state of the canonical one.
        let state = match alias_of {
            Some(canonical) if !asset.state.is_settled() => canonical.state,
            _ => asset.state,
        };

        AssetStatus {
            name: asset.name.clone(),
            sources: asset.sources.clone(),
            state,
            location: asset.location.clone(),
            alias_of: alias_of.map(|canonical| canonical.name.clone()),
        }
    }
}

/// Work handed to the sequencer by [`Registry::begin`].
pub(crate) struct Attempt {
    pub id: AssetId,
    pub name: Box<str>,
    pub sources: Vec<Box<str>>,
    pub verify: Option<Verify>,
}

/// Maps names and locations to canonical records,
/// so that each physical resource is fetched at most once.
#[derive(Clone)]
pub struct Registry {
    table: Arc<Mutex<Table>>,
    spawner: Spawner,
}

impl Registry {
    pub fn new(spawner: Spawner) -> Self {
        Registry {
            table: Arc::new(Mutex::new(Table {
                assets: Slab::new(),
                names: HashMap::default(),
                locations: HashMap::default(),
            })),
            spawner,
        }
    }

    /// Resolves descriptor to a record, merging it with existing ones.
    ///
    /// * Same name - existing record is returned.
    ///   If it was a placeholder it receives the sources.
    /// * Shared location - new record is registered as alias
    ///   of the earliest record owning any of its locations.
    /// * Otherwise new canonical record is registered.
    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, descriptor: Descriptor) -> Result<AssetId, LoadError> {
        let (name, sources, verify) = descriptor.into_parts()?;
        let mut table = self.table.lock();

        if let Some(&id) = table.names.get(&name) {
            let asset = table.get(id);
            if asset.is_inert() && !sources.is_empty() {
                let owner = table.owner_of(&sources);
                let asset = table.get_mut(id);
                asset.sources = sources;
                asset.verify = verify;

                if let Some(canonical) = owner {
                    tracing::debug!("Placeholder `{}` forwards to existing record", name);
                    asset.canonical = Some(canonical);
                    table.index(id);
                    drop(table);
                    self.follow(id, canonical);
                } else {
                    tracing::debug!("Placeholder `{}` received sources", name);
                    table.index(id);
                }
            }
            return Ok(id);
        }

        if let Some(canonical) = table.owner_of(&sources) {
            let deferred = table.get(canonical).deferred.clone();
            let mut asset = Asset::new(name, sources, verify, deferred);
            asset.canonical = Some(canonical);

            let id = table.insert(asset);
            table.index(id);
            tracing::debug!(
                "`{}` aliases `{}`",
                table.get(id).name,
                table.get(canonical).name
            );
            drop(table);
            self.follow(id, canonical);
            return Ok(id);
        }

        let deferred = Deferred::new(&self.spawner);
        let id = table.insert(Asset::new(name, sources, verify, deferred));
        table.index(id);
        Ok(id)
    }

    /// Returns record registered under `name`,
    /// creating sourceless placeholder if there is none.
    pub fn placeholder(&self, name: &str) -> AssetId {
        let mut table = self.table.lock();
        if let Some(&id) = table.names.get(name) {
            return id;
        }

        tracing::trace!("Placeholder `{}` registered", name);
        let deferred = Deferred::new(&self.spawner);
        table.insert(Asset::new(name.into(), Vec::new(), None, deferred))
    }

    pub fn lookup(&self, name: &str) -> Option<AssetId> {
        self.table.lock().names.get(name).copied()
    }

    pub fn status(&self, id: AssetId) -> AssetStatus {
        self.table.lock().status(id)
    }

    /// Promise settled when record is loaded or failed.
    pub fn promise(&self, id: AssetId) -> Promise<()> {
        self.table.lock().get(id).promise()
    }

    /// Returns `true` if record has nothing to load and never settles.
    pub fn is_inert(&self, id: AssetId) -> bool {
        self.table.lock().get(id).is_inert()
    }

    /// Promises of records that have sources but did not settle yet.
    pub fn pending(&self) -> Vec<Promise<()>> {
        let table = self.table.lock();
        table
            .assets
            .iter()
            .filter(|(_, asset)| !asset.is_inert())
            .filter(|&(key, _)| !table.status(AssetId(key)).state.is_settled())
            .map(|(_, asset)| asset.promise())
            .collect()
    }

    /// Moves canonical record of `id` into `Loading` state.
    /// Returns `None` if it was started before or has nothing to load.
    pub(crate) fn begin(&self, id: AssetId) -> Option<Attempt> {
        let mut table = self.table.lock();
        let id = table.canonical_of(id);
        let asset = table.get_mut(id);

        if asset.state != AssetState::Unloaded || asset.sources.is_empty() {
            return None;
        }

        asset.state = AssetState::Loading;
        Some(Attempt {
            id,
            name: asset.name.clone(),
            sources: asset.sources.clone(),
            verify: asset.verify.clone(),
        })
    }

    /// Settles record started with [`Registry::begin`].
    /// `Ok` carries index of the location that loaded.
    pub(crate) fn finish(&self, id: AssetId, outcome: Result<usize, Error>) {
        let deferred = {
            let mut table = self.table.lock();
            let asset = table.get_mut(id);
            match &outcome {
                Ok(index) => {
                    asset.location = asset.sources.get(*index).cloned();
                    asset.state = AssetState::Loaded;
                }
                Err(_) => asset.state = AssetState::Failed,
            }
            asset.deferred.clone()
        };
        deferred.settle(outcome.map(drop));
    }

    /// Mirrors outcome of `canonical` into alias `id` once it settles.
    fn follow(&self, id: AssetId, canonical: AssetId) {
        let table: Weak<Mutex<Table>> = Arc::downgrade(&self.table);
        self.promise(canonical).on_settled(move |result| {
            let table = match table.upgrade() {
                Some(table) => table,
                None => return,
            };

            let deferred = {
                let mut table = table.lock();
                let (state, location) = {
                    let canonical = table.get(canonical);
                    (canonical.state, canonical.location.clone())
                };
                let alias = table.get_mut(id);
                alias.state = state;

                // Canonical location is reported only if the alias lists it too.
                alias.location = location.filter(|location| alias.sources.contains(location));
                alias.deferred.clone()
            };

            // No-op for aliases sharing the canonical deferred.
            deferred.settle(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{promise::PromiseState, task::Executor},
    };

    #[test]
    fn same_name_reuses_record() {
        let executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        let a = registry.resolve(("x", "foo.js").into()).unwrap();
        let b = registry.resolve(("x", "foo.js").into()).unwrap();
        assert_eq!(a, b);
        assert!(registry.promise(a).ptr_eq(&registry.promise(b)));
    }

    #[test]
    fn same_name_keeps_original_sources() {
        let executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        let a = registry.resolve(("x", "foo.js").into()).unwrap();
        registry.resolve(("x", "bar.js").into()).unwrap();
        assert_eq!(registry.status(a).sources, vec![Box::<str>::from("foo.js")]);
    }

    #[test]
    fn placeholder_receives_sources() {
        let executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        let placeholder = registry.placeholder("app");
        assert!(registry.is_inert(placeholder));

        let id = registry
            .resolve(Descriptor::named("app", vec!["app.js", "backup/app.js"]).with_verify(|| true))
            .unwrap();
        assert_eq!(id, placeholder);
        assert!(!registry.is_inert(id));
        assert_eq!(registry.status(id).sources.len(), 2);
    }

    #[test]
    fn shared_location_aliases_earliest() {
        let executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        let first = registry.resolve(("first", vec!["a.js", "shared.js"]).into()).unwrap();
        let second = registry.resolve(("second", "b.js").into()).unwrap();
        let alias = registry
            .resolve(("third", vec!["b.js", "shared.js"]).into())
            .unwrap();

        assert_ne!(alias, first);
        assert_ne!(alias, second);
        assert_eq!(registry.lookup("third"), Some(alias));

        let status = registry.status(alias);
        assert_eq!(status.alias_of.as_deref(), Some("first"));
        assert!(registry.promise(alias).ptr_eq(&registry.promise(first)));
    }

    #[test]
    fn begin_is_idempotent_and_follows_alias() {
        let executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        let x = registry.resolve(("x", "foo.js").into()).unwrap();
        let y = registry.resolve(("y", "foo.js").into()).unwrap();

        let attempt = registry.begin(y).unwrap();
        assert_eq!(attempt.id, x);
        assert!(registry.begin(x).is_none());
        assert!(registry.begin(y).is_none());
        assert_eq!(registry.status(y).state, AssetState::Loading);
    }

    #[test]
    fn finish_sets_location_and_syncs_alias() {
        let mut executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        let x = registry.resolve(("x", vec!["cdn/foo.js", "foo.js"]).into()).unwrap();
        let y = registry.resolve(("y", "foo.js").into()).unwrap();

        let attempt = registry.begin(x).unwrap();
        registry.finish(attempt.id, Ok(1));
        executor.run_until_stalled();

        let x_status = registry.status(x);
        assert_eq!(x_status.state, AssetState::Loaded);
        assert_eq!(x_status.location.as_deref(), Some("foo.js"));

        let y_status = registry.status(y);
        assert_eq!(y_status.state, AssetState::Loaded);
        assert_eq!(y_status.location.as_deref(), Some("foo.js"));
        assert_eq!(registry.promise(y).state(), PromiseState::Fulfilled);
    }

    #[test]
    fn alias_location_is_drawn_from_own_sources() {
        let mut executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        let x = registry.resolve(("x", vec!["cdn/foo.js", "foo.js"]).into()).unwrap();
        let y = registry.resolve(("y", "foo.js").into()).unwrap();

        let attempt = registry.begin(x).unwrap();
        registry.finish(attempt.id, Ok(0));
        executor.run_until_stalled();

        assert_eq!(registry.status(x).location.as_deref(), Some("cdn/foo.js"));

        let y_status = registry.status(y);
        assert_eq!(y_status.state, AssetState::Loaded);
        assert_eq!(y_status.location, None);
        assert_eq!(y_status.alias_of.as_deref(), Some("x"));
    }

    #[test]
    fn placeholder_over_claimed_location_forwards() {
        let mut executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        let owner = registry.resolve(("lib", "lib.js").into()).unwrap();
        let placeholder = registry.placeholder("other");
        let waiting = registry.promise(placeholder);

        registry.resolve(("other", "lib.js").into()).unwrap();
        assert!(registry.begin(placeholder).map(|a| a.id) == Some(owner));

        registry.finish(owner, Err(LoadError::Unspecified.into()));
        executor.run_until_stalled();

        assert_eq!(waiting.state(), PromiseState::Rejected);
        assert_eq!(registry.status(placeholder).state, AssetState::Failed);
    }

    #[test]
    fn pending_skips_inert_and_settled() {
        let executor = Executor::new();
        let registry = Registry::new(executor.spawner());

        registry.placeholder("never");
        let done = registry.resolve(("done", "done.js").into()).unwrap();
        registry.resolve(("busy", "busy.js").into()).unwrap();

        let attempt = registry.begin(done).unwrap();
        registry.finish(attempt.id, Ok(0));

        assert_eq!(registry.pending().len(), 1);
    }
}
