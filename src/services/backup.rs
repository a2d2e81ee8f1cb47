//! Backup store: physical backups and their sidecars under `backups/<rule>/`.
//!
//! The store only touches the filesystem. Bookkeeping of which records
//! exist, retention and event reporting live in the engine.

use crate::models::{BackupMetadata, METADATA_SUFFIX, source_extension, split_extension};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, Utc};
use filetime::FileTime;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::time::SystemTime;
use thiserror::Error;

/// Timestamp embedded in backup filenames, UTC with millisecond precision
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H%M%S%.3f";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: Utf8PathBuf,
        source: io::Error,
    },

    #[error("{0} is not a regular file")]
    NotRegularFile(Utf8PathBuf),

    #[error("failed to serialize backup metadata for {path}: {source}")]
    Serialize {
        path: Utf8PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[error("no backup {filename} is recorded for {rule_key}")]
    NotFound { rule_key: String, filename: String },
}

impl BackupError {
    fn io<'a>(action: &'static str, path: &'a Utf8Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Sidecar records found on disk for one rule
#[derive(Debug, Default)]
pub struct MetadataScan {
    /// Ordered oldest first
    pub records: Vec<BackupMetadata>,
    pub errors: Vec<String>,
}

/// Filesystem side of backups
#[derive(Debug, Clone)]
pub struct BackupStore {
    backups_dir: Utf8PathBuf,
}

impl BackupStore {
    pub fn new(backups_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
        }
    }

    pub fn backups_dir(&self) -> &Utf8Path {
        &self.backups_dir
    }

    /// Directory holding the backups of `rule_key`
    pub fn rule_dir(&self, rule_key: &str) -> Utf8PathBuf {
        self.backups_dir.join(rule_key)
    }

    /// Back up `source` for `rule_key`.
    ///
    /// Returns `Ok(None)` when the source disappeared before it could be
    /// read. `taken` lists filenames already used by the rule; the backup
    /// time is pushed forward by a millisecond until the name is free.
    /// The sidecar is written before the copy and removed again if the copy
    /// fails, so a record on disk always has its file.
    pub fn create_backup(
        &self,
        rule_key: &str,
        source: &Utf8Path,
        taken: &[BackupMetadata],
        now: DateTime<Utc>,
    ) -> Result<Option<BackupMetadata>, BackupError> {
        let stat = match fs::metadata(source) {
            Ok(stat) => stat,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("{} vanished before backup", source);
                return Ok(None);
            }
            Err(e) => return Err(BackupError::io("stat", source)(e)),
        };
        if !stat.is_file() {
            return Err(BackupError::NotRegularFile(source.to_path_buf()));
        }

        let modified = stat
            .modified()
            .map_err(BackupError::io("read modification time of", source))?;
        let mut meta = BackupMetadata::new(source.to_path_buf(), now, modified.into());

        let dir = self.rule_dir(rule_key);
        let mut filename = backup_filename(source, meta.backup_time);
        while self.is_taken(&dir, &filename, source, taken) {
            meta.backup_time += Duration::milliseconds(1);
            filename = backup_filename(source, meta.backup_time);
        }

        create_private_dir(&dir)?;

        let sidecar = dir.join(BackupMetadata::sidecar_name(&filename, source));
        let yaml = serde_yaml_ng::to_string(&meta).map_err(|source| BackupError::Serialize {
            path: sidecar.clone(),
            source,
        })?;
        fs::write(&sidecar, yaml).map_err(BackupError::io("write", &sidecar))?;

        let target = dir.join(&filename);
        if let Err(e) = copy_file(source, &target) {
            if let Err(cleanup) = fs::remove_file(&sidecar) {
                tracing::warn!("Failed to remove orphaned {}: {}", sidecar, cleanup);
            }
            return Err(e);
        }

        tracing::debug!("Copied {} to {}", source, target);
        meta.filename = filename;
        Ok(Some(meta))
    }

    fn is_taken(
        &self,
        dir: &Utf8Path,
        filename: &str,
        source: &Utf8Path,
        taken: &[BackupMetadata],
    ) -> bool {
        taken.iter().any(|meta| meta.filename == filename)
            || dir.join(filename).exists()
            || dir.join(BackupMetadata::sidecar_name(filename, source)).exists()
    }

    /// Remove a backup file and its sidecar. Files already gone are fine.
    pub fn delete_backup(&self, rule_key: &str, meta: &BackupMetadata) -> Result<(), BackupError> {
        let dir = self.rule_dir(rule_key);
        for path in [dir.join(&meta.filename), dir.join(meta.sidecar())] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(BackupError::io("remove", &path)(e)),
            }
        }
        Ok(())
    }

    /// Copy a backup over its source path and restore the recorded
    /// modification time.
    pub fn restore_backup(&self, rule_key: &str, meta: &BackupMetadata) -> Result<(), BackupError> {
        let backup = self.rule_dir(rule_key).join(&meta.filename);
        copy_file(&backup, &meta.source)?;

        let mtime = FileTime::from_system_time(SystemTime::from(meta.last_modified));
        filetime::set_file_times(&meta.source, mtime, mtime)
            .map_err(BackupError::io("set modification time of", &meta.source))?;
        Ok(())
    }

    /// Size in bytes of a backup file, zero if it cannot be read
    pub fn backup_size(&self, rule_key: &str, filename: &str) -> u64 {
        fs::metadata(self.rule_dir(rule_key).join(filename))
            .map(|stat| stat.len())
            .unwrap_or(0)
    }

    /// Read every sidecar of `rule_key`.
    ///
    /// A missing directory means no backups yet. Unreadable or malformed
    /// sidecars are reported and skipped.
    pub fn load_metadata(&self, rule_key: &str) -> MetadataScan {
        let mut scan = MetadataScan::default();
        let dir = self.rule_dir(rule_key);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return scan,
            Err(e) => {
                scan.errors.push(format!("failed to list {}: {}", dir, e));
                return scan;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    scan.errors.push(format!("failed to list {}: {}", dir, e));
                    continue;
                }
            };

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(base) = name.strip_suffix(METADATA_SUFFIX) else {
                continue;
            };
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }

            let path = dir.join(&name);
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    scan.errors.push(format!("failed to read {}: {}", path, e));
                    continue;
                }
            };

            let mut meta: BackupMetadata = match serde_yaml_ng::from_str(&contents) {
                Ok(meta) => meta,
                Err(e) => {
                    scan.errors.push(format!("failed to parse {}: {}", path, e));
                    continue;
                }
            };

            meta.filename = format!("{}{}", base, source_extension(&meta.source));
            scan.records.push(meta);
        }

        scan.records.sort_by(|a, b| a.backup_time.cmp(&b.backup_time));
        scan
    }
}

/// `<stem>-<timestamp><ext>` for a backup of `source` taken at `time`
pub fn backup_filename(source: &Utf8Path, time: DateTime<Utc>) -> String {
    let (stem, ext) = split_extension(source.file_name().unwrap_or_default());
    format!("{}-{}{}", stem, time.format(BACKUP_TIME_FORMAT), ext)
}

/// Copy the bytes of the regular file `src` to `dst` and flush them to disk
pub fn copy_file(src: &Utf8Path, dst: &Utf8Path) -> Result<u64, BackupError> {
    let stat = fs::metadata(src).map_err(BackupError::io("stat", src))?;
    if !stat.is_file() {
        return Err(BackupError::NotRegularFile(src.to_path_buf()));
    }

    let mut reader = File::open(src).map_err(BackupError::io("open", src))?;
    let mut writer = private_file_options()
        .open(dst)
        .map_err(BackupError::io("create", dst))?;

    let copied = io::copy(&mut reader, &mut writer).map_err(BackupError::io("copy to", dst))?;
    writer.sync_all().map_err(BackupError::io("flush", dst))?;
    Ok(copied)
}

fn private_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

fn create_private_dir(dir: &Utf8Path) -> Result<(), BackupError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(BackupError::io("create", dir))
}
