use {
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

/// Which batch strategy the loader uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyChoice {
    /// Pick according to the host ordering guarantees.
    #[default]
    Auto,
    Parallel,
    Sequential,
}

/// Loader tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub strategy: StrategyChoice,

    /// Issue cache-only probes before real loads in sequential mode.
    pub probe: bool,

    /// Upper bound on the wait for host readiness, in milliseconds.
    pub ready_delay_ms: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            strategy: StrategyChoice::Auto,
            probe: true,
            ready_delay_ms: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML loader config")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse RON loader config")]
    Ron(#[from] ron::Error),
}

impl LoaderConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn ready_delay(&self) -> Option<Duration> {
        self.ready_delay_ms.map(Duration::from_millis)
    }
}
