use crate::platform::PlatformInfo;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::time::Duration;

/// Environment prefix for process settings, e.g. `BAACUP_DEBUG=true`
pub const ENV_PREFIX: &str = "BAACUP";

/// Process-level settings that are not part of `config.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuntimeSettings {
    /// Overrides the platform's default base directory
    #[serde(default)]
    pub base_path: Option<Utf8PathBuf>,

    /// Debug level logging
    pub debug: bool,

    /// Also log to the terminal
    pub console: bool,

    /// Change detection cadence
    pub monitor_interval_ms: u64,

    /// Process matching cadence
    pub rules_interval_ms: u64,
}

impl RuntimeSettings {
    /// Read settings from `BAACUP_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_source(
            ::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        )
    }

    /// Read settings from any `config` source, filling in defaults
    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: ::config::Source + Send + Sync + 'static,
    {
        ::config::Config::builder()
            .set_default("debug", false)?
            .set_default("console", true)?
            .set_default("monitor_interval_ms", 1000)?
            .set_default("rules_interval_ms", 15000)?
            .add_source(source)
            .build()
            .context("Failed to read runtime settings")?
            .try_deserialize()
            .context("Invalid runtime settings")
    }

    /// Configured base directory, or the platform default
    pub fn base_path(&self, platform: &dyn PlatformInfo) -> Utf8PathBuf {
        self.base_path
            .clone()
            .unwrap_or_else(|| platform.default_base_path())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    pub fn rules_interval(&self) -> Duration {
        Duration::from_millis(self.rules_interval_ms.max(1))
    }
}
