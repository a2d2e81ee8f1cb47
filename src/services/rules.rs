//! Rule store: reads `rules/*.yaml` and narrows each rule to the current platform.

use crate::models::{ActiveRule, Rule, RulePlatform};
use crate::services::pattern::{PatternCompiler, PatternError, compile_glob};
use camino::{Utf8Path, Utf8PathBuf};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::sync::LazyLock;
use thiserror::Error;

/// Extension of rule definition files
pub const RULE_EXTENSION: &str = "yaml";

/// Where community-maintained rules are published
pub const COMMUNITY_RULES_URL: &str = "https://github.com/cocreators-ee/baacup-rules";

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("Invalid environment variable regex")
});

/// Errors raised while loading rules.
///
/// Everything except [`RuleError::Directory`] only drops the offending
/// rule or path entry.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("error reading rules from {path}: {source}")]
    Read { path: Utf8PathBuf, source: io::Error },

    #[error("error parsing rules from {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[error("{path} does not support {platform}, skipping")]
    UnsupportedPlatform { path: Utf8PathBuf, platform: String },

    #[error("failed to parse pattern {} from {key}.yaml: {}", .source.pattern, .source.message)]
    Pattern { key: String, source: PatternError },

    #[error("cannot list rules directory {path}: {source}")]
    Directory { path: Utf8PathBuf, source: io::Error },
}

/// Fetches rule definitions into the rules directory
pub trait RuleUpdater: Send {
    fn fetch(&self, rules_dir: &Utf8Path) -> anyhow::Result<()>;
}

/// Updater that only points at the community rules repository.
///
/// Remote distribution happens outside the engine; rules are expected to
/// be dropped into the rules directory by the user or a packaging step.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommunityRules;

impl RuleUpdater for CommunityRules {
    fn fetch(&self, rules_dir: &Utf8Path) -> anyhow::Result<()> {
        tracing::info!(
            "No rules in {}, they can be downloaded from {}",
            rules_dir,
            COMMUNITY_RULES_URL
        );
        Ok(())
    }
}

/// Result of a rule load: the usable rules plus every non-fatal problem
#[derive(Debug, Default)]
pub struct RuleLoad {
    pub rules: BTreeMap<String, ActiveRule>,
    pub errors: Vec<RuleError>,
    /// Set when an update was attempted; carries its failure message if any
    pub update_attempt: Option<Result<(), String>>,
}

/// Reads rule definitions for one platform
pub struct RuleStore {
    rules_dir: Utf8PathBuf,
    platform: String,
    compiler: PatternCompiler,
}

impl RuleStore {
    pub fn new(rules_dir: impl Into<Utf8PathBuf>, platform: impl Into<String>) -> Self {
        Self {
            rules_dir: rules_dir.into(),
            platform: platform.into(),
            compiler: compile_glob,
        }
    }

    /// Use a different pattern syntax for executable matching
    pub fn with_compiler(mut self, compiler: PatternCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn rules_dir(&self) -> &Utf8Path {
        &self.rules_dir
    }

    /// Load rules, fetching them once through `updater` if none load and
    /// `auto_update` is set.
    pub fn load_or_update(
        &self,
        updater: &dyn RuleUpdater,
        auto_update: bool,
    ) -> Result<RuleLoad, RuleError> {
        let first = self.load()?;
        if !first.rules.is_empty() || !auto_update {
            return Ok(first);
        }

        tracing::info!("No rules loaded, updating rules");
        let attempt = updater
            .fetch(&self.rules_dir)
            .map_err(|e| format!("rule update failed: {:#}", e));

        let mut second = self.load()?;
        second.update_attempt = Some(attempt);
        Ok(second)
    }

    /// Load every `*.yaml` in the rules directory.
    ///
    /// A missing directory yields no rules. Any other failure to list the
    /// directory is fatal.
    pub fn load(&self) -> Result<RuleLoad, RuleError> {
        let mut load = RuleLoad::default();

        for path in self.rule_files()? {
            let Some(key) = path.file_stem().map(str::to_string) else {
                continue;
            };

            match self.load_rule(&path, &key) {
                Ok((rule, pattern_errors)) => {
                    load.errors.extend(pattern_errors);
                    load.rules.insert(key, rule);
                }
                Err(e) => load.errors.push(e),
            }
        }

        tracing::debug!(
            "Loaded {} rules from {} ({} problems)",
            load.rules.len(),
            self.rules_dir,
            load.errors.len()
        );
        Ok(load)
    }

    fn rule_files(&self) -> Result<Vec<Utf8PathBuf>, RuleError> {
        let entries = match fs::read_dir(&self.rules_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RuleError::Directory {
                    path: self.rules_dir.clone(),
                    source,
                });
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| RuleError::Directory {
                path: self.rules_dir.clone(),
                source,
            })?;

            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                tracing::warn!("Skipping rule file with non UTF-8 name: {:?}", entry.path());
                continue;
            };

            if path.extension() == Some(RULE_EXTENSION) && path.is_file() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    fn load_rule(&self, path: &Utf8Path, key: &str) -> Result<(ActiveRule, Vec<RuleError>), RuleError> {
        let contents = fs::read_to_string(path).map_err(|source| RuleError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let rule: Rule = serde_yaml_ng::from_str(&contents).map_err(|source| RuleError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let Some(platform) = rule.platforms.get(&self.platform) else {
            return Err(RuleError::UnsupportedPlatform {
                path: path.to_path_buf(),
                platform: self.platform.clone(),
            });
        };

        let matcher = (self.compiler)(&platform.executable).map_err(|source| RuleError::Pattern {
            key: key.to_string(),
            source,
        })?;

        let mut errors = Vec::new();
        let mut savegames = Vec::with_capacity(platform.savegames.len());
        for raw in &platform.savegames {
            let expanded = expand_env(raw);
            match glob::Pattern::new(&expanded) {
                Ok(_) => savegames.push(expanded),
                Err(e) => errors.push(RuleError::Pattern {
                    key: key.to_string(),
                    source: PatternError {
                        pattern: expanded,
                        message: e.msg.to_string(),
                    },
                }),
            }
        }

        let active = ActiveRule::new(
            key.to_string(),
            rule.name,
            rule.issues,
            RulePlatform {
                executable: platform.executable.clone(),
                savegames,
            },
            matcher,
        );

        Ok((active, errors))
    }
}

/// Expand `$VAR` and `${VAR}` from the process environment.
///
/// Unset variables are kept as written.
pub fn expand_env(input: &str) -> String {
    expand_vars(input, |name| std::env::var(name).ok())
}

/// Expand `$VAR` and `${VAR}` using `lookup`
pub fn expand_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_VAR
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/player".to_string()),
            "APPDATA" => Some("C:\\Users\\player\\AppData\\Roaming".to_string()),
            _ => None,
        }
    }

    fn write_rule(dir: &Utf8Path, key: &str, contents: &str) {
        fs::write(dir.join(format!("{}.yaml", key)), contents).unwrap();
    }

    fn rules_dir() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    #[test]
    fn test_expand_braced_and_bare() {
        assert_eq!(
            expand_vars("${HOME}/.local/share/game", lookup),
            "/home/player/.local/share/game"
        );
        assert_eq!(expand_vars("$HOME/saves/*", lookup), "/home/player/saves/*");
        assert_eq!(
            expand_vars("${APPDATA}\\Game\\*.sav", lookup),
            "C:\\Users\\player\\AppData\\Roaming\\Game\\*.sav"
        );
    }

    #[test]
    fn test_unset_variables_stay_literal() {
        assert_eq!(expand_vars("${NOPE}/saves", lookup), "${NOPE}/saves");
        assert_eq!(expand_vars("$NOPE/saves", lookup), "$NOPE/saves");
        assert_eq!(expand_vars("costs $5", lookup), "costs $5");
    }

    #[test]
    fn test_load_filters_platform() {
        let (_tmp, dir) = rules_dir();
        write_rule(
            &dir,
            "both",
            "name: Both\nplatforms:\n  linux:\n    executable: \"*/both\"\n    savegames: [\"/saves/*\"]\n  windows:\n    executable: \"*\\\\both.exe\"\n",
        );
        write_rule(
            &dir,
            "windows-only",
            "name: Windows Only\nplatforms:\n  windows:\n    executable: \"*.exe\"\n",
        );

        let load = RuleStore::new(&dir, "linux").load().unwrap();
        assert_eq!(load.rules.len(), 1);
        assert_eq!(load.rules["both"].name, "Both");
        assert_eq!(load.rules["both"].platform.savegames, vec!["/saves/*"]);
        assert_eq!(load.errors.len(), 1);
        assert!(matches!(load.errors[0], RuleError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn test_bad_executable_pattern_drops_rule() {
        let (_tmp, dir) = rules_dir();
        write_rule(
            &dir,
            "broken",
            "name: Broken\nplatforms:\n  linux:\n    executable: \"/opt/[game\"\n",
        );

        let load = RuleStore::new(&dir, "linux").load().unwrap();
        assert!(load.rules.is_empty());
        assert!(matches!(load.errors[0], RuleError::Pattern { .. }));
        assert!(load.errors[0].to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_bad_savegame_pattern_drops_entry() {
        let (_tmp, dir) = rules_dir();
        write_rule(
            &dir,
            "game",
            "name: Game\nplatforms:\n  linux:\n    executable: \"*/game\"\n    savegames: [\"/saves/[x\", \"/saves/*.sav\"]\n",
        );

        let load = RuleStore::new(&dir, "linux").load().unwrap();
        assert_eq!(load.rules["game"].platform.savegames, vec!["/saves/*.sav"]);
        assert_eq!(load.errors.len(), 1);
    }

    #[test]
    fn test_malformed_yaml_is_reported() {
        let (_tmp, dir) = rules_dir();
        write_rule(&dir, "bad", "name: [unterminated\n");
        fs::write(dir.join("notes.txt"), "not a rule").unwrap();

        let load = RuleStore::new(&dir, "linux").load().unwrap();
        assert!(load.rules.is_empty());
        assert_eq!(load.errors.len(), 1);
        assert!(matches!(load.errors[0], RuleError::Parse { .. }));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let (_tmp, dir) = rules_dir();
        let load = RuleStore::new(dir.join("missing"), "linux").load().unwrap();
        assert!(load.rules.is_empty());
        assert!(load.errors.is_empty());
    }

    #[derive(Default)]
    struct WritingUpdater {
        calls: AtomicUsize,
    }

    impl RuleUpdater for WritingUpdater {
        fn fetch(&self, rules_dir: &Utf8Path) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            write_rule(
                rules_dir,
                "fetched",
                "name: Fetched\nplatforms:\n  linux:\n    executable: \"*/fetched\"\n",
            );
            Ok(())
        }
    }

    #[test]
    fn test_update_retries_once_when_empty() {
        let (_tmp, dir) = rules_dir();
        let updater = WritingUpdater::default();

        let load = RuleStore::new(&dir, "linux")
            .load_or_update(&updater, true)
            .unwrap();

        assert_eq!(updater.calls.load(Ordering::SeqCst), 1);
        assert!(load.rules.contains_key("fetched"));
        assert_eq!(load.update_attempt, Some(Ok(())));
    }

    #[test]
    fn test_no_update_when_disabled_or_rules_present() {
        let (_tmp, dir) = rules_dir();
        let updater = WritingUpdater::default();

        let load = RuleStore::new(&dir, "linux")
            .load_or_update(&updater, false)
            .unwrap();
        assert!(load.rules.is_empty());
        assert!(load.update_attempt.is_none());

        write_rule(
            &dir,
            "local",
            "name: Local\nplatforms:\n  linux:\n    executable: \"*/local\"\n",
        );
        RuleStore::new(&dir, "linux")
            .load_or_update(&updater, true)
            .unwrap();
        assert_eq!(updater.calls.load(Ordering::SeqCst), 0);
    }
}
