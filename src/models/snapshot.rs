use super::{ActiveRule, BackupMetadata, Config, Monitor};
use std::collections::BTreeMap;

/// Read-only copy of everything the engine exposes to observers
///
/// Replaced wholesale by the scheduling loop after each pass, so readers
/// never see a collection that is halfway rebuilt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSnapshot {
    /// All loaded rules by key
    pub rules: BTreeMap<String, ActiveRule>,

    pub config: Config,

    /// Backup records by rule key, oldest first
    pub backups: BTreeMap<String, Vec<BackupMetadata>>,

    pub monitors: Vec<Monitor>,

    /// Rules whose game is currently running
    pub active_rules: BTreeMap<String, ActiveRule>,

    /// Most recent first
    pub events: Vec<String>,

    /// Most recent first
    pub errors: Vec<String>,
}

impl EngineSnapshot {
    /// Backup records of one rule
    pub fn backups_for(&self, rule_key: &str) -> &[BackupMetadata] {
        self.backups.get(rule_key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_active(&self, rule_key: &str) -> bool {
        self.active_rules.contains_key(rule_key)
    }
}
