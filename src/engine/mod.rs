//! The detection and backup engine.
//!
//! [`Engine`] owns every mutable collection: loaded rules, active rules,
//! monitors, backup records, config and the event/error logs. Its methods
//! are synchronous and are only ever called from one place at a time,
//! normally the loop in [`scheduler`]. After each operation the engine
//! publishes a fresh [`EngineSnapshot`] through its [`StateManager`].

pub mod scheduler;

pub use scheduler::{Command, EngineHandle, EngineStopped, Intervals, spawn};

use crate::config::{ConfigError, ConfigManager};
use crate::metrics::EngineMetrics;
use crate::models::{ActiveRule, BackupMetadata, Config, EngineSnapshot, EventLog, Monitor};
use crate::platform::PlatformInfo;
use crate::services::backup::{BackupError, BackupStore};
use crate::services::changes::{absolute, find_new_files};
use crate::services::matcher::match_rules;
use crate::services::pattern::PatternCompiler;
use crate::services::processes::{ProcessSnapshot, ProcessSource, SystemProcesses};
use crate::services::retention::{RetentionPolicy, expired_backups};
use crate::services::rules::{COMMUNITY_RULES_URL, CommunityRules, RuleError, RuleStore, RuleUpdater};
use crate::state::{StateChange, StateManager};
use anyhow::Context;
use camino::Utf8Path;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Engine {
    layout: ConfigManager,
    rule_store: RuleStore,
    backup_store: BackupStore,
    processes: Box<dyn ProcessSource>,
    updater: Box<dyn RuleUpdater>,

    config: Config,
    rules: BTreeMap<String, ActiveRule>,
    active_rules: BTreeMap<String, ActiveRule>,
    monitors: Vec<Monitor>,
    /// Records by rule key, oldest first; rules without backups have no entry
    backups: BTreeMap<String, Vec<BackupMetadata>>,
    snapshot: ProcessSnapshot,
    events: EventLog,
    errors: EventLog,

    state: StateManager,
    metrics: Arc<EngineMetrics>,
    /// Something changed since the last publish
    dirty: bool,
}

impl Engine {
    /// Engine for the layout below `layout.base_dir()`, reading the rules
    /// of `platform` and listing processes from the operating system
    pub fn new(layout: ConfigManager, platform: &dyn PlatformInfo) -> Self {
        let metrics = Arc::new(EngineMetrics::new());
        Self {
            rule_store: RuleStore::new(layout.rules_dir(), platform.identifier()),
            backup_store: BackupStore::new(layout.backups_dir()),
            layout,
            processes: Box::new(SystemProcesses::new()),
            updater: Box::new(CommunityRules),
            config: Config::default(),
            rules: BTreeMap::new(),
            active_rules: BTreeMap::new(),
            monitors: Vec::new(),
            backups: BTreeMap::new(),
            snapshot: ProcessSnapshot::default(),
            events: EventLog::default(),
            errors: EventLog::default(),
            state: StateManager::new().with_metrics(Arc::clone(&metrics)),
            metrics,
            dirty: true,
        }
    }

    pub fn with_process_source(mut self, processes: Box<dyn ProcessSource>) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_rule_updater(mut self, updater: Box<dyn RuleUpdater>) -> Self {
        self.updater = updater;
        self
    }

    /// Match executables with something other than shell globs
    pub fn with_pattern_compiler(mut self, compiler: PatternCompiler) -> Self {
        self.rule_store = self.rule_store.with_compiler(compiler);
        self
    }

    /// Create the directory layout, load config and rules and run the
    /// first rule check.
    ///
    /// Fails only for errors that leave the engine unable to work: the
    /// data directories cannot be created, `config.yaml` exists but cannot
    /// be read, or the rules directory cannot be listed.
    pub fn startup(&mut self) -> anyhow::Result<()> {
        self.layout
            .ensure_dirs()
            .context("Failed to create the data directories")?;
        self.load_config()?;
        self.load_rules().context("Failed to load rules")?;
        self.check_rules();
        Ok(())
    }

    /// Load `config.yaml`.
    ///
    /// A missing file is replaced by the defaults on disk. A malformed one
    /// is reported and left alone while the defaults are used in memory.
    pub fn load_config(&mut self) -> anyhow::Result<()> {
        match self.layout.load_config() {
            Ok(Some(config)) => self.config = config,
            Ok(None) => {
                self.config = Config::default();
                self.persist_config();
            }
            Err(e @ ConfigError::Parse { .. }) => {
                self.report_error(format!("{}, using defaults", e));
                self.config = Config::default();
            }
            Err(e) => return Err(e).context("Failed to load config"),
        }
        self.dirty = true;
        self.publish();
        Ok(())
    }

    /// Apply and persist `config`
    pub fn save_config(&mut self, config: Config) {
        self.config = config;
        self.dirty = true;
        self.persist_config();
        // disabled rules may have changed
        self.update_active_rules();
        self.publish();
    }

    fn persist_config(&mut self) {
        if let Err(e) = self.layout.save_config(&self.config) {
            self.report_error(e.to_string());
        }
    }

    /// Replace the loaded rules with what is in the rules directory.
    ///
    /// Problems with single rules are reported. Only a rules directory that
    /// cannot be listed is returned as an error.
    pub fn load_rules(&mut self) -> Result<(), RuleError> {
        let load = self
            .rule_store
            .load_or_update(self.updater.as_ref(), self.config.rules_auto_update)?;

        for error in &load.errors {
            self.report_error(error.to_string());
        }

        match load.update_attempt {
            Some(Ok(())) => {
                self.add_event(format!("Requested a rules update, see {}", COMMUNITY_RULES_URL));
                if !load.rules.is_empty() {
                    self.config.rules_last_updated = Some(Utc::now());
                    self.persist_config();
                }
            }
            Some(Err(message)) => self.report_error(message),
            None => {}
        }

        self.rules = load.rules;
        self.active_rules.retain(|key, _| self.rules.contains_key(key));
        self.monitors.retain(|monitor| self.rules.contains_key(&monitor.rule_key));
        self.add_event(format!("Loaded {} rules", self.rules.len()));

        let changes = self.publish();
        if !changes.iter().any(|c| matches!(c, StateChange::RulesChanged(_))) {
            self.state.announce(StateChange::RulesChanged(self.rules.clone()));
        }
        Ok(())
    }

    /// Refresh the process snapshot, recompute active rules and monitors and
    /// rescan backup records.
    pub fn check_rules(&mut self) {
        self.metrics.record_rule_check();

        if let Err(e) = self.snapshot.refresh(self.processes.as_mut()) {
            self.report_error(e.to_string());
        }
        tracing::debug!("{} running executables", self.snapshot.len());

        self.update_active_rules();
        self.reload_backups();
        self.metrics.log_periodic();
        self.publish();
    }

    fn update_active_rules(&mut self) {
        let matched = match_rules(&self.rules, &self.snapshot, &self.config);

        for (key, rule) in &matched.active {
            if !self.active_rules.contains_key(key) {
                self.add_event(format!("Detected {} as running", rule.name));
            }
        }
        let stopped: Vec<String> = self
            .active_rules
            .iter()
            .filter(|(key, _)| !matched.active.contains_key(*key))
            .map(|(_, rule)| rule.name.clone())
            .collect();
        for name in stopped {
            self.add_event(format!("{} is no longer running", name));
        }

        if matched.active != self.active_rules || matched.monitors != self.monitors {
            self.active_rules = matched.active;
            self.monitors = matched.monitors;
            self.dirty = true;
        }
    }

    // Every loaded rule, so backups of games that are not running can
    // still be restored
    fn reload_backups(&mut self) {
        let mut backups = BTreeMap::new();
        let keys: Vec<String> = self.rules.keys().cloned().collect();

        for key in keys {
            let scan = self.backup_store.load_metadata(&key);
            for error in scan.errors {
                self.report_error(error);
            }
            if !scan.records.is_empty() {
                backups.insert(key, scan.records);
            }
        }

        if backups != self.backups {
            self.backups = backups;
            self.dirty = true;
        }
    }

    /// Back up every monitored file that changed since its last backup
    pub fn check_monitors(&mut self) {
        self.metrics.record_monitor_tick();

        let monitors = self.monitors.clone();
        for monitor in &monitors {
            let scan = find_new_files(&monitor.path, self.backups_for(&monitor.rule_key));
            for error in scan.errors {
                self.report_error(error);
            }
            for path in scan.changed {
                self.add_event(format!("{} needs backup", path));
                self.create_backup(&monitor.rule_key, &path);
            }
        }

        self.publish();
    }

    /// Back up `source` for `rule_key` and apply retention.
    ///
    /// # Returns
    /// Whether a backup was registered. A source that vanished is not an
    /// error and yields `false`.
    pub fn backup_file(&mut self, rule_key: &str, source: &Utf8Path) -> bool {
        let created = self.create_backup(rule_key, source);
        self.publish();
        created
    }

    fn create_backup(&mut self, rule_key: &str, source: &Utf8Path) -> bool {
        let Some(rule_name) = self.rules.get(rule_key).map(|rule| rule.name.clone()) else {
            self.report_error(format!("cannot back up {} for unknown rule {}", source, rule_key));
            return false;
        };

        let source = absolute(source);
        let result = self.backup_store.create_backup(
            rule_key,
            &source,
            self.backups_for(rule_key),
            Utc::now(),
        );

        match result {
            Ok(Some(meta)) => {
                self.backups.entry(rule_key.to_string()).or_default().push(meta);
                self.metrics.record_backup_created();
                self.dirty = true;

                let basename = source.file_name().unwrap_or(source.as_str());
                self.add_event(format!("Backed up {} savegame {}", rule_name, basename));
                self.enforce_retention(rule_key);
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.metrics.record_backup_failed();
                self.report_error(format!("failed to back up {}: {}", source, e));
                false
            }
        }
    }

    fn enforce_retention(&mut self, rule_key: &str) {
        let policy = RetentionPolicy::from(&self.config);
        let expired = expired_backups(self.backups_for(rule_key), &policy, Utc::now(), |meta| {
            self.backup_store.backup_size(rule_key, &meta.filename)
        });

        for filename in expired {
            self.remove_backup(rule_key, &filename);
        }
    }

    /// Delete a backup file, its sidecar and its record.
    ///
    /// Files that are already gone are fine. Other removal errors are
    /// reported; the record is dropped anyway.
    ///
    /// # Returns
    /// `false` if no such record exists or a file could not be removed
    pub fn delete_backup(&mut self, rule_key: &str, filename: &str) -> bool {
        let deleted = self.remove_backup(rule_key, filename);
        self.publish();
        deleted
    }

    fn remove_backup(&mut self, rule_key: &str, filename: &str) -> bool {
        let position = self
            .backups
            .get(rule_key)
            .and_then(|records| records.iter().position(|meta| meta.filename == filename));
        let Some(position) = position else {
            self.report_error(
                BackupError::NotFound {
                    rule_key: rule_key.to_string(),
                    filename: filename.to_string(),
                }
                .to_string(),
            );
            return false;
        };

        let Some(records) = self.backups.get_mut(rule_key) else {
            return false;
        };
        let meta = records.remove(position);
        if records.is_empty() {
            self.backups.remove(rule_key);
        }

        let removed = match self.backup_store.delete_backup(rule_key, &meta) {
            Ok(()) => true,
            Err(e) => {
                self.report_error(e.to_string());
                false
            }
        };
        self.metrics.record_backup_pruned();
        self.dirty = true;

        let name = self.rule_name(rule_key);
        self.add_event(format!("Removed old backup for {}, {}", name, filename));
        removed
    }

    /// Copy a backup over its source and restore the recorded modification
    /// time
    pub fn restore_backup(&mut self, rule_key: &str, filename: &str) -> bool {
        let restored = self.restore(rule_key, filename);
        self.metrics.record_restore(restored);
        self.publish();
        restored
    }

    fn restore(&mut self, rule_key: &str, filename: &str) -> bool {
        let meta = self
            .backups_for(rule_key)
            .iter()
            .find(|meta| meta.filename == filename)
            .cloned();
        let Some(meta) = meta else {
            self.report_error(format!(
                "tried to restore {} but couldn't find its metadata",
                filename
            ));
            return false;
        };

        match self.backup_store.restore_backup(rule_key, &meta) {
            Ok(()) => {
                let name = self.rule_name(rule_key);
                self.add_event(format!("Restored {} {} to {}", name, filename, meta.source));
                true
            }
            Err(e) => {
                self.report_error(format!("failed to restore {}: {}", filename, e));
                false
            }
        }
    }

    /// Empty the error log
    pub fn clear_errors(&mut self) {
        self.errors.clear();
        self.dirty = true;
        self.publish();
    }

    /// Append to the event log
    pub fn add_event(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.events.push(message);
        self.dirty = true;
    }

    /// Append to the error log
    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.errors.push(message);
        self.dirty = true;
    }

    /// Hand a snapshot to the state manager if anything changed since the
    /// last one
    pub fn publish(&mut self) -> Vec<StateChange> {
        if !self.dirty {
            return Vec::new();
        }
        self.dirty = false;
        self.state.publish(self.to_snapshot())
    }

    fn to_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            rules: self.rules.clone(),
            config: self.config.clone(),
            backups: self.backups.clone(),
            monitors: self.monitors.clone(),
            active_rules: self.active_rules.clone(),
            events: self.events.to_vec(),
            errors: self.errors.to_vec(),
        }
    }

    fn rule_name(&self, rule_key: &str) -> String {
        self.rules
            .get(rule_key)
            .map(|rule| rule.name.clone())
            .unwrap_or_else(|| rule_key.to_string())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rules(&self) -> &BTreeMap<String, ActiveRule> {
        &self.rules
    }

    pub fn active_rules(&self) -> &BTreeMap<String, ActiveRule> {
        &self.active_rules
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn backups(&self) -> &BTreeMap<String, Vec<BackupMetadata>> {
        &self.backups
    }

    /// Records of one rule, oldest first
    pub fn backups_for(&self, rule_key: &str) -> &[BackupMetadata] {
        self.backups.get(rule_key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Event log, newest first
    pub fn events(&self) -> Vec<String> {
        self.events.to_vec()
    }

    /// Error log, newest first
    pub fn errors(&self) -> Vec<String> {
        self.errors.to_vec()
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn layout(&self) -> &ConfigManager {
        &self.layout
    }
}
