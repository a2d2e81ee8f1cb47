//! Retention: which backups of a rule have to go.
//!
//! Policies are applied newest-first, so whatever survives is always the
//! most recent part of the history.

use crate::models::{BackupMetadata, Config};
use chrono::{DateTime, Duration, Utc};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Limits applied to the backups of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of backups; `None` is unlimited
    pub keep_saves: Option<usize>,
    /// Backups older than the age are thinned down to the count
    pub compaction: Option<(Duration, usize)>,
    /// Maximum summed size of the backup files
    pub max_bytes: Option<u64>,
}

impl RetentionPolicy {
    /// Only the count limit
    pub fn keep(keep_saves: usize) -> Self {
        Self {
            keep_saves: Some(keep_saves),
            compaction: None,
            max_bytes: None,
        }
    }
}

impl From<&Config> for RetentionPolicy {
    fn from(config: &Config) -> Self {
        let keep_saves = (config.backups.keep_saves > 0).then_some(config.backups.keep_saves);
        let compaction = (config.compaction.compact_after_days > 0).then(|| {
            (
                Duration::days(i64::from(config.compaction.compact_after_days)),
                config.compaction.keep_saves,
            )
        });
        let max_bytes = (config.backups.max_mb_per_game > 0)
            .then(|| config.backups.max_mb_per_game.saturating_mul(BYTES_PER_MB));

        Self {
            keep_saves,
            compaction,
            max_bytes,
        }
    }
}

/// Filenames of the backups that fall outside `policy`, newest first.
///
/// `size_of` reports the on-disk size of a backup and is only consulted
/// when a size limit is set.
pub fn expired_backups<F>(
    records: &[BackupMetadata],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
    size_of: F,
) -> Vec<String>
where
    F: Fn(&BackupMetadata) -> u64,
{
    let mut kept: Vec<&BackupMetadata> = records.iter().collect();
    kept.sort_by(|a, b| b.backup_time.cmp(&a.backup_time));

    let mut expired = Vec::new();

    if let Some(keep_saves) = policy.keep_saves {
        if kept.len() > keep_saves {
            expired.extend(kept.drain(keep_saves..).map(|m| m.filename.clone()));
        }
    }

    if let Some((age, keep_old)) = policy.compaction {
        let cutoff = now - age;
        let mut old_seen = 0;
        kept.retain(|meta| {
            if meta.backup_time >= cutoff {
                return true;
            }
            old_seen += 1;
            if old_seen <= keep_old {
                true
            } else {
                expired.push(meta.filename.clone());
                false
            }
        });
    }

    if let Some(max_bytes) = policy.max_bytes {
        let mut total: u64 = kept.iter().map(|meta| size_of(meta)).sum();
        while total > max_bytes && kept.len() > 1 {
            if let Some(oldest) = kept.pop() {
                total = total.saturating_sub(size_of(oldest));
                expired.push(oldest.filename.clone());
            }
        }
    }

    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn record(name: &str, backup_time: DateTime<Utc>) -> BackupMetadata {
        let mut meta = BackupMetadata::new(Utf8PathBuf::from("/saves/save.dat"), backup_time, backup_time);
        meta.filename = name.to_string();
        meta
    }

    fn history(now: DateTime<Utc>, ages_in_days: &[i64]) -> Vec<BackupMetadata> {
        ages_in_days
            .iter()
            .map(|days| record(&format!("save-{}d.dat", days), now - Duration::days(*days)))
            .collect()
    }

    #[test]
    fn test_keep_saves_drops_oldest() {
        let now = Utc::now();
        let records = history(now, &[3, 1, 2, 0]);

        let expired = expired_backups(&records, &RetentionPolicy::keep(2), now, |_| 0);
        assert_eq!(expired, vec!["save-2d.dat", "save-3d.dat"]);
    }

    #[test]
    fn test_within_limit_keeps_everything() {
        let now = Utc::now();
        let records = history(now, &[0, 1]);
        assert!(expired_backups(&records, &RetentionPolicy::keep(2), now, |_| 0).is_empty());
    }

    #[test]
    fn test_compaction_thins_old_backups() {
        let now = Utc::now();
        let records = history(now, &[0, 1, 200, 210, 220, 230]);
        let policy = RetentionPolicy {
            keep_saves: None,
            compaction: Some((Duration::days(180), 2)),
            max_bytes: None,
        };

        let expired = expired_backups(&records, &policy, now, |_| 0);
        assert_eq!(expired, vec!["save-220d.dat", "save-230d.dat"]);
    }

    #[test]
    fn test_size_cap_keeps_newest() {
        let now = Utc::now();
        let records = history(now, &[0, 1, 2]);
        let policy = RetentionPolicy {
            keep_saves: None,
            compaction: None,
            max_bytes: Some(250),
        };

        let expired = expired_backups(&records, &policy, now, |_| 100);
        assert_eq!(expired, vec!["save-2d.dat"]);

        let tight = RetentionPolicy {
            max_bytes: Some(10),
            ..policy
        };
        let expired = expired_backups(&records, &tight, now, |_| 100);
        assert_eq!(expired, vec!["save-2d.dat", "save-1d.dat"]);
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = Config::default();
        let policy = RetentionPolicy::from(&config);
        assert_eq!(policy.keep_saves, Some(50));
        assert_eq!(policy.compaction, Some((Duration::days(180), 5)));
        assert_eq!(policy.max_bytes, Some(500 * 1024 * 1024));

        config.backups.keep_saves = 0;
        config.backups.max_mb_per_game = 0;
        config.compaction.compact_after_days = 0;
        let policy = RetentionPolicy::from(&config);
        assert_eq!(policy.keep_saves, None);
        assert_eq!(policy.compaction, None);
        assert_eq!(policy.max_bytes, None);
    }
}
