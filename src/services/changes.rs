//! Change detection by polling modification times.
//!
//! A savegame needs a backup unless some existing backup of the same source
//! recorded a modification time at or after the file's current one.

use crate::models::BackupMetadata;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;

/// Outcome of one glob expansion pass
#[derive(Debug, Default)]
pub struct ChangeScan {
    /// Files that need a backup, in glob order
    pub changed: Vec<Utf8PathBuf>,
    /// Problems worth reporting; vanished files are not included
    pub errors: Vec<String>,
}

/// Expand `pattern` and return the files newer than their latest backup.
pub fn find_new_files(pattern: &str, backups: &[BackupMetadata]) -> ChangeScan {
    let mut scan = ChangeScan::default();

    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => {
            scan.errors.push(format!("invalid savegame pattern {}: {}", pattern, e));
            return scan;
        }
    };

    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                if e.error().kind() != io::ErrorKind::NotFound {
                    scan.errors.push(e.to_string());
                }
                continue;
            }
        };

        let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
            scan.errors.push(format!("skipping non UTF-8 path matched by {}", pattern));
            continue;
        };

        let path = absolute(&path);
        match needs_backup(&path, backups) {
            Ok(true) => {
                tracing::debug!("{} needs backup", path);
                scan.changed.push(path);
            }
            Ok(false) => {}
            Err(e) if is_benign(&e) => {}
            Err(e) => scan.errors.push(format!("cannot stat {}: {}", path, e)),
        }
    }

    scan
}

/// Whether `path` must be backed up given the existing `backups`.
///
/// Directories never need a backup. A file without prior backups always
/// does. Otherwise any record for the same source whose stored
/// modification time is not strictly before the current one suppresses it.
pub fn needs_backup(path: &Utf8Path, backups: &[BackupMetadata]) -> io::Result<bool> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Ok(false);
    }

    let modified: DateTime<Utc> = metadata.modified()?.into();
    Ok(is_newer_than_all(modified, backups_for_source(backups, path)))
}

/// `modified` is strictly after every recorded modification time
pub fn is_newer_than_all<'a, I>(modified: DateTime<Utc>, records: I) -> bool
where
    I: IntoIterator<Item = &'a BackupMetadata>,
{
    records.into_iter().all(|meta| modified > meta.last_modified)
}

/// Records belonging to `source`
pub fn backups_for_source<'a>(
    backups: &'a [BackupMetadata],
    source: &'a Utf8Path,
) -> impl Iterator<Item = &'a BackupMetadata> {
    backups.iter().filter(move |meta| meta.source.as_path() == source)
}

/// Make `path` absolute against the current directory
pub fn absolute(path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::path::absolute(path)
        .ok()
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Errors that only mean the file went away while we looked at it
pub fn is_benign(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn temp_dir() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    fn mtime(path: &Utf8Path) -> DateTime<Utc> {
        fs::metadata(path).unwrap().modified().unwrap().into()
    }

    fn record(source: &Utf8Path, last_modified: DateTime<Utc>) -> BackupMetadata {
        BackupMetadata::new(source.to_path_buf(), Utc::now(), last_modified)
    }

    #[test]
    fn test_no_prior_backup_needs_backup() {
        let (_tmp, dir) = temp_dir();
        let save = dir.join("save.dat");
        fs::write(&save, b"slot 1").unwrap();

        let scan = find_new_files(dir.join("*.dat").as_str(), &[]);
        assert_eq!(scan.changed, vec![save]);
        assert!(scan.errors.is_empty());
    }

    #[test]
    fn test_equal_mtime_suppresses() {
        let (_tmp, dir) = temp_dir();
        let save = dir.join("save.dat");
        fs::write(&save, b"slot 1").unwrap();

        let backups = vec![record(&save, mtime(&save))];
        assert!(!needs_backup(&save, &backups).unwrap());
    }

    #[test]
    fn test_newer_file_needs_backup() {
        let (_tmp, dir) = temp_dir();
        let save = dir.join("save.dat");
        fs::write(&save, b"slot 1").unwrap();

        let backups = vec![record(&save, mtime(&save) - Duration::seconds(10))];
        assert!(needs_backup(&save, &backups).unwrap());
    }

    #[test]
    fn test_any_later_record_suppresses() {
        let now = Utc::now();
        let source = Utf8PathBuf::from("/saves/save.dat");
        let records = vec![
            record(&source, now - Duration::hours(2)),
            record(&source, now + Duration::hours(1)),
        ];
        assert!(!is_newer_than_all(now, &records));
        assert!(is_newer_than_all(now, &records[..1]));
    }

    #[test]
    fn test_records_for_other_sources_ignored() {
        let (_tmp, dir) = temp_dir();
        let save = dir.join("save.dat");
        fs::write(&save, b"slot 1").unwrap();

        let other = dir.join("other.dat");
        let backups = vec![record(&other, mtime(&save) + Duration::hours(1))];
        assert!(needs_backup(&save, &backups).unwrap());
    }

    #[test]
    fn test_directories_are_skipped() {
        let (_tmp, dir) = temp_dir();
        fs::create_dir(dir.join("slot1")).unwrap();
        fs::write(dir.join("slot1.dat"), b"x").unwrap();

        let scan = find_new_files(dir.join("slot1*").as_str(), &[]);
        assert_eq!(scan.changed, vec![dir.join("slot1.dat")]);
    }

    #[test]
    fn test_no_matches_is_quiet() {
        let (_tmp, dir) = temp_dir();
        let scan = find_new_files(dir.join("missing/*.sav").as_str(), &[]);
        assert!(scan.changed.is_empty());
        assert!(scan.errors.is_empty());
    }

    #[test]
    fn test_invalid_pattern_reported() {
        let scan = find_new_files("/saves/[oops", &[]);
        assert!(scan.changed.is_empty());
        assert_eq!(scan.errors.len(), 1);
    }

    #[test]
    fn test_second_scan_is_idempotent() {
        let (_tmp, dir) = temp_dir();
        let save = dir.join("save.dat");
        fs::write(&save, b"slot 1").unwrap();

        let first = find_new_files(dir.join("*.dat").as_str(), &[]);
        assert_eq!(first.changed.len(), 1);

        let backups = vec![record(&save, mtime(&save))];
        let second = find_new_files(dir.join("*.dat").as_str(), &backups);
        assert!(second.changed.is_empty());
    }
}
