//! Process snapshot: executable paths of everything currently running.

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("process listing is not supported on this system")]
    Unsupported,

    #[error("failed to list processes: {0}")]
    Enumeration(String),
}

/// Source of running executables.
///
/// Implementations skip processes whose executable cannot be read
/// (permissions, already exited) and only fail for the listing as a whole.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessSource: Send {
    fn executables(&mut self) -> Result<Vec<String>, ProcessError>;
}

/// [`ProcessSource`] backed by the operating system process table
pub struct SystemProcesses {
    system: System,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SystemProcesses {
    fn executables(&mut self) -> Result<Vec<String>, ProcessError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProcessError::Unsupported);
        }

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );

        // Processes we may not inspect have no exe; non UTF-8 paths cannot
        // match a rule pattern either.
        Ok(self
            .system
            .processes()
            .values()
            .filter_map(|process| process.exe())
            .filter_map(|exe| exe.to_str())
            .map(str::to_string)
            .collect())
    }
}

/// Deduplicated executable paths from the last successful listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    executables: Vec<String>,
}

impl ProcessSnapshot {
    pub fn from_executables<I>(executables: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut snapshot = Self::default();
        snapshot.replace(executables);
        snapshot
    }

    /// Refresh from `source`.
    ///
    /// On failure the previous snapshot is kept and the error returned.
    pub fn refresh(&mut self, source: &mut dyn ProcessSource) -> Result<usize, ProcessError> {
        let executables = source.executables()?;
        self.replace(executables);
        Ok(self.executables.len())
    }

    fn replace<I>(&mut self, executables: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = std::collections::HashSet::new();
        self.executables = executables
            .into_iter()
            .filter(|exe| seen.insert(exe.clone()))
            .collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.executables.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.executables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executables.is_empty()
    }
}
