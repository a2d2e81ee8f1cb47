//! The single scheduling loop that drives an [`Engine`].
//!
//! One tokio task owns the engine and multiplexes the shutdown signal,
//! commands and the two timers. Every engine operation runs to completion
//! before the next branch is polled, so shutdown is only ever observed
//! between operations.

use super::Engine;
use crate::config::RuntimeSettings;
use crate::metrics::EngineMetrics;
use crate::models::Config;
use crate::state::StateManager;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

const COMMAND_BUFFER: usize = 32;

/// Requests served by the loop between timer passes
#[derive(Debug)]
pub enum Command {
    /// Load rules, then check them against running processes
    ReloadRules,
    CheckRules,
    DeleteBackup {
        rule_key: String,
        filename: String,
        reply: oneshot::Sender<bool>,
    },
    RestoreBackup {
        rule_key: String,
        filename: String,
        reply: oneshot::Sender<bool>,
    },
    SaveConfig {
        config: Config,
        reply: oneshot::Sender<()>,
    },
    ClearErrors,
}

/// Timer cadences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    /// Change detection
    pub monitor: Duration,
    /// Process matching
    pub rules: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            monitor: Duration::from_secs(1),
            rules: Duration::from_secs(15),
        }
    }
}

impl From<&RuntimeSettings> for Intervals {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            monitor: settings.monitor_interval(),
            rules: settings.rules_interval(),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("the engine loop is not running")]
pub struct EngineStopped;

/// Handle to a running engine loop.
///
/// [`shutdown()`](Self::shutdown) consumes the handle, so the stop signal
/// can be sent at most once. Dropping the handle stops the loop as well.
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Engine>,
    state: StateManager,
    metrics: Arc<EngineMetrics>,
}

/// Start the loop for an engine that has been through
/// [`Engine::startup()`]. Must be called from within a tokio runtime.
pub fn spawn(engine: Engine, intervals: Intervals) -> EngineHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let state = engine.state().clone();
    let metrics = engine.metrics();

    let task = tokio::spawn(run(engine, intervals, command_rx, shutdown_rx));

    EngineHandle {
        commands: command_tx,
        shutdown: shutdown_tx,
        task,
        state,
        metrics,
    }
}

impl EngineHandle {
    /// Published engine state and its change notifications
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    async fn send(&self, command: Command) -> Result<(), EngineStopped> {
        self.commands.send(command).await.map_err(|_| EngineStopped)
    }

    pub async fn reload_rules(&self) -> Result<(), EngineStopped> {
        self.send(Command::ReloadRules).await
    }

    pub async fn check_rules(&self) -> Result<(), EngineStopped> {
        self.send(Command::CheckRules).await
    }

    pub async fn clear_errors(&self) -> Result<(), EngineStopped> {
        self.send(Command::ClearErrors).await
    }

    /// Delete a backup and wait for the outcome
    pub async fn delete_backup(
        &self,
        rule_key: impl Into<String>,
        filename: impl Into<String>,
    ) -> Result<bool, EngineStopped> {
        let (reply, response) = oneshot::channel();
        self.send(Command::DeleteBackup {
            rule_key: rule_key.into(),
            filename: filename.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| EngineStopped)
    }

    /// Restore a backup and wait for the outcome
    pub async fn restore_backup(
        &self,
        rule_key: impl Into<String>,
        filename: impl Into<String>,
    ) -> Result<bool, EngineStopped> {
        let (reply, response) = oneshot::channel();
        self.send(Command::RestoreBackup {
            rule_key: rule_key.into(),
            filename: filename.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| EngineStopped)
    }

    /// Apply and persist `config`, waiting until the loop has done so
    pub async fn save_config(&self, config: Config) -> Result<(), EngineStopped> {
        let (reply, response) = oneshot::channel();
        self.send(Command::SaveConfig { config, reply }).await?;
        response.await.map_err(|_| EngineStopped)
    }

    /// Stop the loop and get the engine back
    pub async fn shutdown(self) -> anyhow::Result<Engine> {
        // The loop may already be gone if it panicked
        let _ = self.shutdown.send(());
        self.task.await.context("Engine loop terminated abnormally")
    }
}

async fn run(
    mut engine: Engine,
    intervals: Intervals,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown: oneshot::Receiver<()>,
) -> Engine {
    let mut monitor_timer = time::interval(intervals.monitor);
    monitor_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Startup already checked the rules once
    let mut rules_timer = time::interval_at(Instant::now() + intervals.rules, intervals.rules);
    rules_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        "Engine loop started: monitors every {:?}, rules every {:?}",
        intervals.monitor,
        intervals.rules
    );

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!("Shutdown requested, stopping engine loop");
                break;
            }
            Some(command) = commands.recv() => handle_command(&mut engine, command),
            _ = rules_timer.tick() => engine.check_rules(),
            _ = monitor_timer.tick() => engine.check_monitors(),
        }
    }

    engine
}

fn handle_command(engine: &mut Engine, command: Command) {
    tracing::debug!("Handling {:?}", command);
    match command {
        Command::ReloadRules => {
            if let Err(e) = engine.load_rules() {
                engine.report_error(e.to_string());
            }
            engine.check_rules();
        }
        Command::CheckRules => engine.check_rules(),
        Command::DeleteBackup {
            rule_key,
            filename,
            reply,
        } => {
            let _ = reply.send(engine.delete_backup(&rule_key, &filename));
        }
        Command::RestoreBackup {
            rule_key,
            filename,
            reply,
        } => {
            let _ = reply.send(engine.restore_backup(&rule_key, &filename));
        }
        Command::SaveConfig { config, reply } => {
            engine.save_config(config);
            let _ = reply.send(());
        }
        Command::ClearErrors => engine.clear_errors(),
    }
}
