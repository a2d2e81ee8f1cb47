//! Data models for the Baacup engine.
//!
//! - [`Config`]: Global tunables persisted to `config.yaml`
//! - [`Rule`] / [`RulePlatform`]: Game rules as written in `rules/*.yaml`
//! - [`ActiveRule`]: A rule narrowed to the current platform with its compiled executable pattern
//! - [`Monitor`]: A savegame path pattern being polled for a running game
//! - [`BackupMetadata`]: The sidecar record for one backup snapshot
//! - [`EventLog`]: Bounded most-recent-first log used for events and errors
//! - [`EngineSnapshot`]: What observers of the engine get to read

pub mod backup;
pub mod config;
pub mod event_log;
pub mod rule;
pub mod snapshot;

pub use backup::{BackupMetadata, METADATA_SUFFIX, source_extension, split_extension};
pub use self::config::{BackupConfig, CompactionConfig, Config};
pub use event_log::{EventLog, LOG_MAX_LENGTH};
pub use rule::{ActiveRule, Monitor, Rule, RulePlatform};
pub use snapshot::EngineSnapshot;
