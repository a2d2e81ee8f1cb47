//! Platform capability: which rule section applies and where data lives.
//!
//! One implementation per supported operating system, selected at startup
//! with [`current`].

use camino::Utf8PathBuf;

/// Name of the data directory created under the user's home
const BASE_DIR_NAME: &str = "Baacup";

/// Platform-specific identity and defaults
pub trait PlatformInfo: Send + Sync {
    /// Key used for this platform in rule files
    fn identifier(&self) -> &'static str;

    /// Directory holding config, rules and backups
    fn default_base_path(&self) -> Utf8PathBuf;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Linux;

#[derive(Debug, Clone, Copy, Default)]
pub struct MacOs;

#[derive(Debug, Clone, Copy, Default)]
pub struct Windows;

impl PlatformInfo for Linux {
    fn identifier(&self) -> &'static str {
        "linux"
    }

    fn default_base_path(&self) -> Utf8PathBuf {
        home_dir().join(BASE_DIR_NAME)
    }
}

impl PlatformInfo for MacOs {
    fn identifier(&self) -> &'static str {
        "macos"
    }

    fn default_base_path(&self) -> Utf8PathBuf {
        home_dir().join(BASE_DIR_NAME)
    }
}

impl PlatformInfo for Windows {
    fn identifier(&self) -> &'static str {
        "windows"
    }

    fn default_base_path(&self) -> Utf8PathBuf {
        dirs::document_dir()
            .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
            .unwrap_or_else(home_dir)
    }
}

/// Platform the engine is running on.
///
/// Anything that is neither Windows nor macOS uses the Linux rules, which
/// tends to work for the BSDs as well.
pub fn current() -> &'static dyn PlatformInfo {
    if cfg!(target_os = "windows") {
        &Windows
    } else if cfg!(target_os = "macos") {
        &MacOs
    } else {
        &Linux
    }
}

fn home_dir() -> Utf8PathBuf {
    dirs::home_dir()
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}
