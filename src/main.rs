//! Baacup - Automatic savegame backups for running games
//!
//! Main entry point for the background engine.
//!
//! # Execution Flow
//!
//! 1. Read runtime settings from `BAACUP_*` environment variables
//! 2. Initialize logging → `<base>/logs/baacup.<date>`
//! 3. Create a multi-thread tokio runtime
//! 4. Start the engine: directories, `config.yaml`, rules, first rule check
//! 5. Spawn the scheduling loop (change detection every second, process
//!    matching every 15 seconds by default)
//! 6. Wait for Ctrl-C, stop the loop once and log the metrics summary
//!
//! # Data Directory
//!
//! `~/Baacup` on Linux and macOS, the Documents folder on Windows, or
//! `BAACUP_BASE_PATH` if set:
//! - `config.yaml`: retention, disabled rules, auto-update
//! - `rules/*.yaml`: one rule per game
//! - `backups/<rule>/`: backups and their `.baacup.yaml` sidecars

use anyhow::{Context, Result};
use baacup::engine::{self, Engine, Intervals};
use baacup::logging::{LOG_PREFIX, setup_logging};
use baacup::{APP_NAME, ConfigManager, RuntimeSettings, VERSION, platform};

fn main() -> Result<()> {
    let settings = RuntimeSettings::from_env()?;
    let platform = platform::current();
    let layout = ConfigManager::new(settings.base_path(platform));

    let _guard = setup_logging(layout.logs_dir(), LOG_PREFIX, settings.debug, settings.console)?;

    tracing::info!(
        "Starting {} v{} on {}, data in {}",
        APP_NAME,
        VERSION,
        platform.identifier(),
        layout.base_dir()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("baacup-worker")
        .build()
        .context("Failed to build the tokio runtime")?;

    runtime.block_on(async {
        let mut engine = Engine::new(layout, platform);
        engine.startup()?;

        let metrics = engine.metrics();
        let handle = engine::spawn(engine, Intervals::from(&settings));

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        tracing::info!("Received Ctrl-C, shutting down");

        handle.shutdown().await?;
        metrics.log_summary();
        Ok::<_, anyhow::Error>(())
    })?;

    tracing::info!("Application shutdown complete");
    Ok(())
}
