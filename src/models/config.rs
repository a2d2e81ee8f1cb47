use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine configuration from `config.yaml`
///
/// Single process-wide instance. Loaded at startup, mutated only through
/// explicit save operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub disabled_rules: Vec<String>,

    #[serde(default)]
    pub backups: BackupConfig,

    #[serde(default)]
    pub compaction: CompactionConfig,

    #[serde(default)]
    pub rules_last_updated: Option<DateTime<Utc>>,

    #[serde(default = "default_rules_auto_update")]
    pub rules_auto_update: bool,
}

/// How many backups to keep per game and how much space they may use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Count limit per rule. 0 disables the limit.
    #[serde(default = "default_keep_saves")]
    pub keep_saves: usize,

    /// Size limit per rule in MiB. 0 disables the limit.
    #[serde(default = "default_max_mb_per_game")]
    pub max_mb_per_game: u64,
}

/// Thinning of old backups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "default_compaction_keep_saves")]
    pub keep_saves: usize,

    /// Age in days after which a backup is subject to compaction. 0 disables compaction.
    #[serde(default = "default_compact_after_days")]
    pub compact_after_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disabled_rules: Vec::new(),
            backups: BackupConfig::default(),
            compaction: CompactionConfig::default(),
            rules_last_updated: None,
            rules_auto_update: true,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            keep_saves: default_keep_saves(),
            max_mb_per_game: default_max_mb_per_game(),
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            keep_saves: default_compaction_keep_saves(),
            compact_after_days: default_compact_after_days(),
        }
    }
}

impl Config {
    /// Check if a rule was switched off by the user
    pub fn is_rule_disabled(&self, rule_key: &str) -> bool {
        self.disabled_rules.iter().any(|k| k == rule_key)
    }
}

fn default_keep_saves() -> usize {
    50
}

fn default_max_mb_per_game() -> u64 {
    500
}

fn default_compaction_keep_saves() -> usize {
    5
}

fn default_compact_after_days() -> u32 {
    180
}

fn default_rules_auto_update() -> bool {
    true
}
