mod runtime;

pub use runtime::RuntimeSettings;

use crate::models::Config;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

/// Name of the persisted engine configuration
pub const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io { path: Utf8PathBuf, source: io::Error },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_yaml_ng::Error),
}

/// Owner of the on-disk layout below the base directory.
///
/// ```text
/// <base>/config.yaml
/// <base>/rules/<key>.yaml
/// <base>/backups/<key>/...
/// <base>/logs/
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    base_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    rules_dir: Utf8PathBuf,
    backups_dir: Utf8PathBuf,
    logs_dir: Utf8PathBuf,
}

impl ConfigManager {
    /// Describe the layout below `base_dir`. Nothing is created yet.
    pub fn new<P: AsRef<Utf8Path>>(base_dir: P) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        Self {
            config_path: base_dir.join(CONFIG_FILE_NAME),
            rules_dir: base_dir.join("rules"),
            backups_dir: base_dir.join("backups"),
            logs_dir: base_dir.join("logs"),
            base_dir,
        }
    }

    /// Create the base, rules and backups directories
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.base_dir, &self.rules_dir, &self.backups_dir] {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Load `config.yaml`.
    ///
    /// # Returns
    /// `None` if the file does not exist yet
    pub fn load_config(&self) -> Result<Option<Config>, ConfigError> {
        let file_contents = match fs::read_to_string(&self.config_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Config file not found at {}, using defaults", self.config_path);
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.config_path.clone(),
                    source,
                });
            }
        };

        let config: Config =
            serde_yaml_ng::from_str(&file_contents).map_err(|source| ConfigError::Parse {
                path: self.config_path.clone(),
                source,
            })?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(Some(config))
    }

    /// Save `config.yaml`.
    pub fn save_config(&self, config: &Config) -> Result<(), ConfigError> {
        let yaml_string = serde_yaml_ng::to_string(config).map_err(ConfigError::Serialize)?;

        fs::write(&self.config_path, yaml_string).map_err(|source| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        })?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    pub fn rules_dir(&self) -> &Utf8Path {
        &self.rules_dir
    }

    pub fn backups_dir(&self) -> &Utf8Path {
        &self.backups_dir
    }

    pub fn logs_dir(&self) -> &Utf8Path {
        &self.logs_dir
    }
}
