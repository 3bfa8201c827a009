use {
    super::{
        asset::AssetId,
        registry::{Attempt, Registry},
        source::{FetchMode, Source},
    },
    crate::{
        error::LoadError,
        promise::{all_settled, Promise},
        task::Spawner,
    },
    std::sync::Arc,
};

/// Ordering constraints of a single record load.
pub(crate) enum Gate {
    /// Start fetching right away.
    Immediate,

    /// Wait for host readiness and for every dependency to settle first.
    /// With `probe` each location is preceded by a cache-only fetch.
    After {
        ready: Promise<()>,
        dependencies: Vec<Promise<()>>,
        probe: bool,
    },
}

/// Drives records through their fallback locations.
#[derive(Clone)]
pub(crate) struct Sequencer {
    registry: Registry,
    source: Arc<dyn Source>,
    spawner: Spawner,
}

impl Sequencer {
    pub fn new(registry: Registry, source: Arc<dyn Source>, spawner: Spawner) -> Self {
        Sequencer {
            registry,
            source,
            spawner,
        }
    }

    /// Starts loading the record unless it was started before.
    /// Sourceless records are left untouched and their promise never settles.
    pub fn start(&self, id: AssetId, gate: Gate) -> Promise<()> {
        let promise = self.registry.promise(id);
        if let Some(attempt) = self.registry.begin(id) {
            tracing::debug!("Start loading `{}`", attempt.name);
            self.spawner.spawn(self.clone().run(attempt, gate));
        }
        promise
    }

    fn probe(&self, location: &str) -> Promise<()> {
        self.source
            .fetch(&self.spawner, location, None, FetchMode::Cache)
    }

    async fn run(self, attempt: Attempt, gate: Gate) {
        let probe = match gate {
            Gate::Immediate => false,
            Gate::After {
                ready,
                mut dependencies,
                probe,
            } => {
                if let Err(err) = ready.await {
                    tracing::error!("Host never became ready for `{}`: {}", attempt.name, err);
                    self.registry.finish(attempt.id, Err(err));
                    return;
                }

                if probe {
                    dependencies.push(self.probe(&attempt.sources[0]));
                }

                // Outcomes are irrelevant here. Failures of earlier
                // records do not hold this one back.
                all_settled(&self.spawner, dependencies).await.ok();
                probe
            }
        };

        let mut last = None;
        for (index, location) in attempt.sources.iter().enumerate() {
            if probe && index > 0 {
                if let Err(err) = self.probe(location).await {
                    tracing::debug!("Cache probe of `{}` failed: {}", location, err);
                }
            }

            let fetched = self.source.fetch(
                &self.spawner,
                location,
                attempt.verify.as_ref(),
                FetchMode::Execute,
            );

            match fetched.await {
                Ok(()) => {
                    tracing::debug!("`{}` loaded from `{}`", attempt.name, location);
                    self.registry.finish(attempt.id, Ok(index));
                    return;
                }
                Err(err) => {
                    tracing::warn!("Failed to load `{}` from `{}`: {}", attempt.name, location, err);
                    last = Some(err);
                }
            }
        }

        tracing::error!("No source of `{}` could be loaded", attempt.name);
        let exhausted = LoadError::Exhausted {
            name: attempt.name.clone(),
            attempts: attempt.sources.len(),
            last,
        };
        self.registry.finish(attempt.id, Err(exhausted.into()));
    }
}
