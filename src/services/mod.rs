//! Services: the filesystem and process facing building blocks of the engine.
//!
//! None of these hold engine state. The [`crate::engine::Engine`] owns the
//! loaded rules, monitors and backup records and drives the services from
//! its timers.
//!
//! # Components
//!
//! - [`rules`]: loads `rules/*.yaml`, narrows rules to the current platform
//!   and expands environment variables in savegame paths
//! - [`pattern`]: compiled executable patterns behind [`ExecutableMatcher`]
//! - [`processes`]: the running-executable snapshot
//! - [`matcher`]: decides which rules are running and what to monitor
//! - [`changes`]: finds savegames modified since their latest backup
//! - [`backup`]: writes, deletes, restores and rescans backups on disk
//! - [`retention`]: picks the backups that exceed the configured limits

pub mod backup;
pub mod changes;
pub mod matcher;
pub mod pattern;
pub mod processes;
pub mod retention;
pub mod rules;

pub use backup::{BackupError, BackupStore, MetadataScan, backup_filename, copy_file};
pub use changes::{ChangeScan, find_new_files, needs_backup};
pub use matcher::{RuleMatch, match_rules};
pub use pattern::{ExecutableMatcher, GlobMatcher, PatternCompiler, PatternError, compile_glob};
pub use processes::{ProcessError, ProcessSnapshot, ProcessSource, SystemProcesses};
pub use retention::{RetentionPolicy, expired_backups};
pub use rules::{CommunityRules, RuleError, RuleLoad, RuleStore, RuleUpdater, expand_env};
