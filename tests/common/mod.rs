//! Shared fixtures for the integration tests
#![allow(dead_code)]

use baacup::platform::Linux;
use baacup::services::{ProcessError, ProcessSource};
use baacup::{ConfigManager, Engine};
use camino::{Utf8Path, Utf8PathBuf};
use filetime::FileTime;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Process list the tests can change while the engine holds it
#[derive(Clone, Default)]
pub struct SharedProcesses(Arc<Mutex<Vec<String>>>);

impl SharedProcesses {
    pub fn running(executables: &[&str]) -> Self {
        let processes = Self::default();
        processes.set(executables);
        processes
    }

    pub fn set(&self, executables: &[&str]) {
        *self.0.lock().unwrap() = executables.iter().map(|s| s.to_string()).collect();
    }
}

impl ProcessSource for SharedProcesses {
    fn executables(&mut self) -> Result<Vec<String>, ProcessError> {
        Ok(self.0.lock().unwrap().clone())
    }
}

/// A throwaway base directory with a `saves/` folder for fake games
pub struct TestHome {
    _temp_dir: TempDir,
    pub base: Utf8PathBuf,
    pub saves: Utf8PathBuf,
}

impl TestHome {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let saves = base.join("saves");
        fs::create_dir_all(base.join("rules")).unwrap();
        fs::create_dir_all(&saves).unwrap();
        Self {
            _temp_dir: temp_dir,
            base,
            saves,
        }
    }

    pub fn layout(&self) -> ConfigManager {
        ConfigManager::new(&self.base)
    }

    /// Write `rules/<key>.yaml` with a linux section
    pub fn write_rule(&self, key: &str, name: &str, executable: &str, savegames: &[&str]) {
        let mut yaml = format!(
            "name: {}\nissues: https://example.com/issues\nplatforms:\n  linux:\n    executable: \"{}\"\n",
            name, executable
        );
        if !savegames.is_empty() {
            yaml.push_str("    savegames:\n");
        }
        for savegame in savegames {
            yaml.push_str(&format!("      - \"{}\"\n", savegame));
        }
        fs::write(self.base.join("rules").join(format!("{}.yaml", key)), yaml).unwrap();
    }

    pub fn write_config(&self, yaml: &str) {
        fs::write(self.base.join("config.yaml"), yaml).unwrap();
    }

    /// Glob for `*.dat` files in the saves folder
    pub fn saves_glob(&self) -> String {
        format!("{}/*.dat", self.saves)
    }

    /// Write a savegame with a fixed modification time
    pub fn write_save(&self, name: &str, contents: &[u8], mtime_secs: i64) -> Utf8PathBuf {
        let path = self.saves.join(name);
        fs::write(&path, contents).unwrap();
        set_mtime(&path, mtime_secs);
        path
    }

    pub fn backup_dir(&self, rule_key: &str) -> Utf8PathBuf {
        self.base.join("backups").join(rule_key)
    }

    /// Engine on the linux rules, already started
    pub fn engine(&self, processes: &SharedProcesses) -> Engine {
        let mut engine =
            Engine::new(self.layout(), &Linux).with_process_source(Box::new(processes.clone()));
        engine.startup().unwrap();
        engine
    }
}

pub fn set_mtime(path: &Utf8Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

pub fn mtime_secs(path: &Utf8Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}
