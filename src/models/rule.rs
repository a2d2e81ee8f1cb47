use crate::services::pattern::ExecutableMatcher;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A game rule as written in `rules/<key>.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,

    /// Where to report problems with this rule
    #[serde(default)]
    pub issues: String,

    /// Platform identifier (`linux`, `macos`, `windows`) to platform data
    #[serde(default)]
    pub platforms: IndexMap<String, RulePlatform>,
}

/// The per-platform section of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePlatform {
    /// Glob matched against full executable paths
    pub executable: String,

    /// Savegame path globs, in file order
    #[serde(default)]
    pub savegames: Vec<String>,
}

/// A rule narrowed to the platform the engine runs on, with its
/// executable pattern compiled once at load time.
#[derive(Clone)]
pub struct ActiveRule {
    /// Rule file name without `.yaml`; unique
    pub key: String,
    pub name: String,
    pub issues: String,
    pub platform: RulePlatform,
    matcher: Arc<dyn ExecutableMatcher>,
}

impl ActiveRule {
    pub fn new(
        key: String,
        name: String,
        issues: String,
        platform: RulePlatform,
        matcher: Arc<dyn ExecutableMatcher>,
    ) -> Self {
        Self {
            key,
            name,
            issues,
            platform,
            matcher,
        }
    }

    /// Check if this rule's executable pattern matches any of the given paths
    pub fn is_running<'a, I>(&self, executables: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        executables
            .into_iter()
            .any(|exe| self.matcher.matches(exe))
    }
}

impl fmt::Debug for ActiveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveRule")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("issues", &self.issues)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

// The matcher is derived from `platform.executable`, so comparing the
// pattern text is enough.
impl PartialEq for ActiveRule {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.name == other.name
            && self.issues == other.issues
            && self.platform == other.platform
    }
}

/// A savegame path pattern that must be polled because its rule's game is running
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Monitor {
    pub path: String,
    pub rule_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pattern::GlobMatcher;

    fn rule_with_pattern(pattern: &str) -> ActiveRule {
        let platform = RulePlatform {
            executable: pattern.to_string(),
            savegames: vec![],
        };
        ActiveRule::new(
            "game".to_string(),
            "Game".to_string(),
            String::new(),
            platform,
            Arc::new(GlobMatcher::compile(pattern).unwrap()),
        )
    }

    #[test]
    fn test_rule_yaml_layout() {
        let yaml = r#"
name: Stardew Valley
issues: https://github.com/cocreators-ee/baacup-rules/issues
platforms:
  linux:
    executable: "*/Stardew Valley"
    savegames:
      - "${HOME}/.config/StardewValley/Saves/*/*"
  windows:
    executable: "*\\Stardew Valley.exe"
    savegames:
      - "${APPDATA}\\StardewValley\\Saves\\*\\*"
"#;
        let rule: Rule = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(rule.name, "Stardew Valley");
        assert_eq!(rule.platforms.len(), 2);
        assert_eq!(rule.platforms.keys().next().unwrap(), "linux");
        assert_eq!(rule.platforms["linux"].savegames.len(), 1);
    }

    #[test]
    fn test_is_running() {
        let rule = rule_with_pattern("/usr/bin/game*");
        assert!(rule.is_running(["/usr/bin/bash", "/usr/bin/game2"]));
        assert!(!rule.is_running(["/usr/bin/other"]));
        assert!(!rule.is_running(std::iter::empty()));
    }

    #[test]
    fn test_equality_ignores_matcher_identity() {
        assert_eq!(rule_with_pattern("/a/*"), rule_with_pattern("/a/*"));
        assert_ne!(rule_with_pattern("/a/*"), rule_with_pattern("/b/*"));
    }
}
