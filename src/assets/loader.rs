use {
    super::{
        asset::{AssetId, AssetStatus},
        key::Descriptor,
        registry::Registry,
        sequence::{Gate, Sequencer},
        source::{Environment, FetchMode, OrderedHost, Source, Verify},
    },
    crate::{
        config::{LoaderConfig, StrategyChoice},
        error::{Error, LoadError},
        promise::{all_of, delay, race, Next, Observable, Promise},
        task::Spawner,
    },
    parking_lot::Mutex,
    std::{
        fmt::{self, Debug},
        sync::Arc,
    },
};

/// How a batch of records is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// All records start loading at once.
    Parallel,

    /// Each record starts its real load only after
    /// every record declared before it in the batch has settled.
    SequentialPreload,
}

/// Stand-in used when builder received no source.
struct NoSource;

impl Source for NoSource {
    fn fetch(
        &self,
        spawner: &Spawner,
        location: &str,
        _verify: Option<&Verify>,
        _mode: FetchMode,
    ) -> Promise<()> {
        Promise::from_result(
            spawner,
            Err(LoadError::NotFound {
                location: location.into(),
            }
            .into()),
        )
    }
}

/// Builder for [`Loader`].
/// Allows configure loader with [`Source`] and host [`Environment`].
pub struct LoaderBuilder {
    spawner: Spawner,
    source: Option<Arc<dyn Source>>,
    environment: Arc<dyn Environment>,
    config: LoaderConfig,
    strategy: Option<Strategy>,
}

impl LoaderBuilder {
    /// Returns new [`LoaderBuilder`] without source
    /// for a host that is always ready and keeps load order.
    pub fn new(spawner: Spawner) -> Self {
        LoaderBuilder {
            spawner,
            source: None,
            environment: Arc::new(OrderedHost),
            config: LoaderConfig::default(),
            strategy: None,
        }
    }

    /// Sets source that fetches resources.
    pub fn set_source(&mut self, source: impl Source) -> &mut Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Sets source that fetches resources.
    pub fn with_source(mut self, source: impl Source) -> Self {
        self.set_source(source);
        self
    }

    pub fn set_environment(&mut self, environment: impl Environment) -> &mut Self {
        self.environment = Arc::new(environment);
        self
    }

    pub fn with_environment(mut self, environment: impl Environment) -> Self {
        self.set_environment(environment);
        self
    }

    pub fn set_config(&mut self, config: LoaderConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.set_config(config);
        self
    }

    /// Forces the strategy regardless of config and host capabilities.
    pub fn set_strategy(&mut self, strategy: Strategy) -> &mut Self {
        self.strategy = Some(strategy);
        self
    }

    /// Forces the strategy regardless of config and host capabilities.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.set_strategy(strategy);
        self
    }

    /// Builds and returns new [`Loader`] instance.
    pub fn build(self) -> Loader {
        let strategy = match (self.strategy, self.config.strategy) {
            (Some(strategy), _) => strategy,
            (None, StrategyChoice::Parallel) => Strategy::Parallel,
            (None, StrategyChoice::Sequential) => Strategy::SequentialPreload,
            (None, StrategyChoice::Auto) if self.environment.preserves_order() => {
                Strategy::Parallel
            }
            (None, StrategyChoice::Auto) => Strategy::SequentialPreload,
        };

        let source = match self.source {
            Some(source) => source,
            None => {
                tracing::warn!("Loader built without source. Every fetch will fail");
                Arc::new(NoSource)
            }
        };

        let registry = Registry::new(self.spawner.clone());
        let sequencer = Sequencer::new(registry.clone(), source, self.spawner.clone());

        tracing::debug!("Loader uses {:?} strategy", strategy);

        Loader {
            shared: Arc::new(Shared {
                registry,
                sequencer,
                environment: self.environment,
                spawner: self.spawner,
                config: self.config,
                strategy,
                gate: Mutex::new(None),
            }),
        }
    }
}

struct Shared {
    registry: Registry,
    sequencer: Sequencer,
    environment: Arc<dyn Environment>,
    spawner: Spawner,
    config: LoaderConfig,
    strategy: Strategy,

    /// Readiness gate of the sequential strategy. Built on first use.
    gate: Mutex<Option<Promise<()>>>,
}

/// Loads batches of resources, each at most once.
#[derive(Clone)]
pub struct Loader {
    shared: Arc<Shared>,
}

impl Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("strategy", &self.shared.strategy)
            .field("config", &self.shared.config)
            .finish()
    }
}

impl Loader {
    /// Returns [`LoaderBuilder`] instance
    pub fn builder(spawner: Spawner) -> LoaderBuilder {
        LoaderBuilder::new(spawner)
    }

    pub fn strategy(&self) -> Strategy {
        self.shared.strategy
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Registers descriptor without starting the load.
    pub fn resolve(&self, descriptor: impl Into<Descriptor>) -> Result<AssetHandle, Error> {
        let id = self.shared.registry.resolve(descriptor.into())?;
        Ok(AssetHandle {
            id,
            registry: self.shared.registry.clone(),
        })
    }

    pub fn status(&self, name: &str) -> Option<AssetStatus> {
        let id = self.shared.registry.lookup(name)?;
        Some(self.shared.registry.status(id))
    }

    /// Loads the batch and returns promise fulfilled when all of it is loaded.
    ///
    /// Records requested before are not loaded again.
    /// Records without sources never settle and neither does the batch.
    #[tracing::instrument(skip(self, descriptors))]
    pub fn submit<I, D>(&self, descriptors: I) -> Promise<()>
    where
        I: IntoIterator<Item = D>,
        D: Into<Descriptor>,
    {
        let shared = &*self.shared;
        let mut promises = Vec::new();

        match shared.strategy {
            Strategy::Parallel => {
                for descriptor in descriptors {
                    match shared.registry.resolve(descriptor.into()) {
                        Ok(id) => promises.push(shared.sequencer.start(id, Gate::Immediate)),
                        Err(err) => promises.push(self.invalid(err)),
                    }
                }
            }
            Strategy::SequentialPreload => {
                let ready = self.ready_gate();
                let mut enqueued = Vec::new();

                for descriptor in descriptors {
                    let id = match shared.registry.resolve(descriptor.into()) {
                        Ok(id) => id,
                        Err(err) => {
                            promises.push(self.invalid(err));
                            continue;
                        }
                    };

                    let gate = Gate::After {
                        ready: ready.clone(),
                        dependencies: enqueued.clone(),
                        probe: shared.config.probe,
                    };
                    let promise = shared.sequencer.start(id, gate);

                    // Sourceless records hold the rest of the batch
                    // until they receive sources and load.
                    enqueued.push(promise.clone());
                    promises.push(promise);
                }
            }
        }

        all_of(&shared.spawner, promises)
    }

    /// Same as [`Loader::submit`], calling `on_complete` once the batch is loaded.
    pub fn submit_with<I, D, F>(&self, descriptors: I, on_complete: F) -> Promise<()>
    where
        I: IntoIterator<Item = D>,
        D: Into<Descriptor>,
        F: FnOnce() + Send + 'static,
    {
        let promise = self.submit(descriptors);
        promise.on_fulfilled(move |()| on_complete());
        promise
    }

    /// Submits `on_pass` if `condition` holds and `on_fail` otherwise.
    pub fn submit_if<I, D>(&self, condition: bool, on_pass: I, on_fail: I) -> Promise<()>
    where
        I: IntoIterator<Item = D>,
        D: Into<Descriptor>,
    {
        if condition {
            self.submit(on_pass)
        } else {
            self.submit(on_fail)
        }
    }

    /// Calls `on_complete` once record named `name` is loaded.
    ///
    /// Name may be declared later. Until then it refers to a placeholder.
    pub fn notify<F>(&self, name: &str, on_complete: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let promise = self.named(name);
        promise.on_fulfilled(move |()| on_complete());
        promise
    }

    /// Promise fulfilled once every named record is loaded.
    pub fn notify_all<I, S>(&self, names: I) -> Promise<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let promises: Vec<_> = names
            .into_iter()
            .map(|name| self.named(name.as_ref()))
            .collect();
        all_of(&self.shared.spawner, promises)
    }

    /// Once host is ready, waits for every record that has sources
    /// and did not settle yet, then calls `on_complete`.
    pub fn notify_pending<F>(&self, on_complete: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let registry = self.shared.registry.clone();
        let spawner = self.shared.spawner.clone();

        let promise = self
            .ready_gate()
            .then(move |()| Ok(Next::Adopt(all_of(&spawner, registry.pending()))));
        promise.on_fulfilled(move |()| on_complete());
        promise
    }

    /// Calls `on_complete` once host reports it is ready.
    pub fn when_ready<F>(&self, on_complete: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let promise = self.shared.environment.ready(&self.shared.spawner);
        promise.on_fulfilled(move |()| on_complete());
        promise
    }

    fn named(&self, name: &str) -> Promise<()> {
        let registry = &self.shared.registry;
        let id = match registry.lookup(name) {
            Some(id) => id,
            None => registry.placeholder(name),
        };
        registry.promise(id)
    }

    fn invalid(&self, err: LoadError) -> Promise<()> {
        tracing::error!("Skipping descriptor: {}", err);
        Promise::from_result(&self.shared.spawner, Err(err.into()))
    }

    fn ready_gate(&self) -> Promise<()> {
        if let Some(gate) = &*self.shared.gate.lock() {
            return gate.clone();
        }

        let shared = &*self.shared;
        let ready = shared.environment.ready(&shared.spawner);
        let gate = match shared.config.ready_delay() {
            Some(duration) => race(&shared.spawner, vec![ready, delay(&shared.spawner, duration)]),
            None => ready,
        };

        // Another caller may have built the gate in the meantime.
        shared.gate.lock().get_or_insert(gate).clone()
    }
}

/// Handle to a registered record.
#[derive(Clone)]
pub struct AssetHandle {
    id: AssetId,
    registry: Registry,
}

impl Debug for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AssetHandle").field(&self.id).finish()
    }
}

impl AssetHandle {
    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn name(&self) -> Box<str> {
        self.registry.status(self.id).name
    }

    pub fn status(&self) -> AssetStatus {
        self.registry.status(self.id)
    }

    pub fn promise(&self) -> Promise<()> {
        self.registry.promise(self.id)
    }
}

impl Observable<()> for AssetHandle {
    fn promise(&self) -> Promise<()> {
        self.registry.promise(self.id)
    }
}
