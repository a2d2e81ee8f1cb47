// State management module
//
// This module provides the StateManager which holds the latest EngineSnapshot
// behind Arc<RwLock<T>> and emits change events for observers.

use crate::metrics::EngineMetrics;
use crate::models::{ActiveRule, BackupMetadata, Config, EngineSnapshot, Monitor};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when the published snapshot changes
///
/// Each variant carries the full current value of the collection, so an
/// observer never has to read the snapshot back to apply it.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The set of loaded rules was replaced
    RulesChanged(BTreeMap<String, ActiveRule>),

    ConfigChanged(Config),

    /// Backup records of any rule changed
    BackupsChanged(BTreeMap<String, Vec<BackupMetadata>>),

    MonitorsChanged(Vec<Monitor>),

    ActiveRulesChanged(BTreeMap<String, ActiveRule>),

    /// Event log, newest first
    EventsChanged(Vec<String>),

    /// Error log, newest first
    ErrorsChanged(Vec<String>),
}

/// Thread-safe holder of the published engine state
///
/// The scheduling loop is the only writer: it builds a complete
/// [`EngineSnapshot`] and hands it to [`publish()`](Self::publish). Readers
/// use [`snapshot()`](Self::snapshot), [`read()`](Self::read) or the
/// accessors and can subscribe to [`StateChange`] events.
///
/// Sending never blocks and never fails the engine; events with no
/// subscriber are counted as misses when metrics are attached.
pub struct StateManager {
    state: Arc<RwLock<EngineSnapshot>>,
    state_tx: broadcast::Sender<StateChange>,
    metrics: Option<Arc<EngineMetrics>>,
}

impl StateManager {
    /// Create a new StateManager with an empty snapshot
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(EngineSnapshot::default())),
            state_tx,
            metrics: None,
        }
    }

    /// Count broadcasts in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get a copy of the current snapshot
    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the snapshot
    ///
    /// # Example
    /// ```ignore
    /// let running = state_manager.read(|state| state.active_rules.len());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&EngineSnapshot) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Replace the snapshot and emit an event for every collection that
    /// differs from the previous one
    ///
    /// # Returns
    /// The events that were emitted
    pub fn publish(&self, next: EngineSnapshot) -> Vec<StateChange> {
        let changes = {
            let mut state = self.state.write().unwrap();
            let changes = detect_changes(&state, &next);
            *state = next;
            changes
        };

        for change in &changes {
            self.announce(change.clone());
        }

        changes
    }

    /// Emit an event without touching the snapshot
    pub fn announce(&self, change: StateChange) {
        // Ignore send errors - it's OK if no one is listening
        let delivered = self.state_tx.send(change).is_ok();
        if let Some(metrics) = &self.metrics {
            if delivered {
                metrics.record_state_broadcast();
            } else {
                metrics.record_state_broadcast_miss();
            }
        }
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state changes.
    /// Multiple subscribers can listen simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    // Accessors for the individual collections

    pub fn rules(&self) -> BTreeMap<String, ActiveRule> {
        self.read(|state| state.rules.clone())
    }

    pub fn config(&self) -> Config {
        self.read(|state| state.config.clone())
    }

    pub fn active_monitors(&self) -> Vec<Monitor> {
        self.read(|state| state.monitors.clone())
    }

    pub fn active_backups(&self) -> BTreeMap<String, Vec<BackupMetadata>> {
        self.read(|state| state.backups.clone())
    }

    pub fn active_rules(&self) -> BTreeMap<String, ActiveRule> {
        self.read(|state| state.active_rules.clone())
    }

    pub fn errors(&self) -> Vec<String> {
        self.read(|state| state.errors.clone())
    }

    pub fn events(&self) -> Vec<String> {
        self.read(|state| state.events.clone())
    }
}

/// Detect what changed between two snapshots and generate events
fn detect_changes(old: &EngineSnapshot, new: &EngineSnapshot) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.rules != new.rules {
        changes.push(StateChange::RulesChanged(new.rules.clone()));
    }
    if old.config != new.config {
        changes.push(StateChange::ConfigChanged(new.config.clone()));
    }
    if old.backups != new.backups {
        changes.push(StateChange::BackupsChanged(new.backups.clone()));
    }
    if old.monitors != new.monitors {
        changes.push(StateChange::MonitorsChanged(new.monitors.clone()));
    }
    if old.active_rules != new.active_rules {
        changes.push(StateChange::ActiveRulesChanged(new.active_rules.clone()));
    }
    if old.events != new.events {
        changes.push(StateChange::EventsChanged(new.events.clone()));
    }
    if old.errors != new.errors {
        changes.push(StateChange::ErrorsChanged(new.errors.clone()));
    }

    changes
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
            metrics: self.metrics.clone(),
        }
    }
}
