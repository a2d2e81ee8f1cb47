use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix of the sidecar file stored next to each backup
pub const METADATA_SUFFIX: &str = ".baacup.yaml";

/// Metadata for one backed up savegame file
///
/// `filename` is not part of the sidecar; it is empty until the backup
/// has been written and is otherwise derived from the sidecar's own name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    #[serde(skip)]
    pub filename: String,

    /// Absolute path of the original savegame
    pub source: Utf8PathBuf,

    /// When the backup was taken
    pub backup_time: DateTime<Utc>,

    /// The source's modification time at capture
    pub last_modified: DateTime<Utc>,
}

impl BackupMetadata {
    /// Create an unwritten record for `source`
    pub fn new(source: Utf8PathBuf, backup_time: DateTime<Utc>, last_modified: DateTime<Utc>) -> Self {
        Self {
            filename: String::new(),
            source,
            backup_time,
            last_modified,
        }
    }

    /// Whether the physical backup has been written
    pub fn is_written(&self) -> bool {
        !self.filename.is_empty()
    }

    /// Sidecar file name of this record
    pub fn sidecar(&self) -> String {
        Self::sidecar_name(&self.filename, &self.source)
    }

    /// Sidecar file name belonging to the backup `filename` of `source`.
    ///
    /// The source's extension is removed from the backup name, so a source
    /// without one keeps the milliseconds of the timestamp in the stem.
    pub fn sidecar_name(filename: &str, source: &Utf8Path) -> String {
        let ext = source_extension(source);
        let stem = filename.strip_suffix(ext).unwrap_or(filename);
        format!("{}{}", stem, METADATA_SUFFIX)
    }
}

/// Extension of `source`'s file name including its dot, or `""`
pub fn source_extension(source: &Utf8Path) -> &str {
    split_extension(source.file_name().unwrap_or_default()).1
}

/// Split a file name into stem and extension, the extension keeping its dot.
///
/// The extension starts at the last dot of the name, so `.profile` has an
/// empty stem and `world.tar.gz` keeps `world.tar` as its stem.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) => file_name.split_at(idx),
        None => (file_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("save.dat"), ("save", ".dat"));
        assert_eq!(split_extension("world.tar.gz"), ("world.tar", ".gz"));
        assert_eq!(split_extension("SaveGameInfo"), ("SaveGameInfo", ""));
        assert_eq!(split_extension(".profile"), ("", ".profile"));
    }

    #[test]
    fn test_sidecar_name() {
        assert_eq!(
            BackupMetadata::sidecar_name(
                "save-2024-03-01T101500.250.dat",
                Utf8Path::new("/saves/save.dat")
            ),
            "save-2024-03-01T101500.250.baacup.yaml"
        );
    }

    #[test]
    fn test_sidecar_name_without_extension() {
        assert_eq!(
            BackupMetadata::sidecar_name(
                "SaveGameInfo-2024-03-01T101500.250",
                Utf8Path::new("/saves/Farm_1/SaveGameInfo")
            ),
            "SaveGameInfo-2024-03-01T101500.250.baacup.yaml"
        );
        assert_eq!(source_extension(Utf8Path::new("/saves/SaveGameInfo")), "");
    }

    #[test]
    fn test_sidecar_omits_filename() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        let mut meta = BackupMetadata::new(Utf8PathBuf::from("/saves/save.dat"), time, time);
        meta.filename = "save-2024-03-01T101500.000.dat".to_string();

        let yaml = serde_yaml_ng::to_string(&meta).unwrap();
        assert!(!yaml.contains("filename"));
        assert!(yaml.contains("source: /saves/save.dat"));

        let parsed: BackupMetadata = serde_yaml_ng::from_str(&yaml).unwrap();
        assert!(!parsed.is_written());
        assert_eq!(parsed.backup_time, time);
    }
}
