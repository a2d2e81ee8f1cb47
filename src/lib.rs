// Baacup - Automatic savegame backups for running games
//
// This is the library crate containing the detection and backup engine.
// The binary crate (main.rs) runs it as a background process.

pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod platform;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use self::config::{ConfigManager, RuntimeSettings};
pub use engine::{Engine, EngineHandle, Intervals};
pub use metrics::EngineMetrics;
pub use models::{ActiveRule, BackupMetadata, Config, EngineSnapshot, Monitor, Rule};
pub use platform::PlatformInfo;
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
