//! Compiled pattern abstraction used for executable matching.
//!
//! The engine only depends on [`ExecutableMatcher`]; [`GlobMatcher`] is the
//! shell-glob implementation used for rule files.

use std::fmt;
use thiserror::Error;

/// A pattern compiled once and tested against many candidates
pub trait ExecutableMatcher: Send + Sync {
    fn matches(&self, candidate: &str) -> bool;
}

/// Compiles pattern text into a matcher
pub type PatternCompiler = fn(&str) -> Result<std::sync::Arc<dyn ExecutableMatcher>, PatternError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid pattern {pattern}: {message}")]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

/// Shell-glob matcher.
///
/// `*` and `?` also match path separators, so `*/game` matches any
/// absolute path ending in `/game`.
#[derive(Clone)]
pub struct GlobMatcher {
    pattern: glob::Pattern,
}

impl GlobMatcher {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        glob::Pattern::new(pattern)
            .map(|pattern| Self { pattern })
            .map_err(|e| PatternError {
                pattern: pattern.to_string(),
                message: e.msg.to_string(),
            })
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl ExecutableMatcher for GlobMatcher {
    fn matches(&self, candidate: &str) -> bool {
        self.pattern.matches(candidate)
    }
}

impl fmt::Debug for GlobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobMatcher").field(&self.as_str()).finish()
    }
}

/// Default [`PatternCompiler`] for rule files
pub fn compile_glob(pattern: &str) -> Result<std::sync::Arc<dyn ExecutableMatcher>, PatternError> {
    Ok(std::sync::Arc::new(GlobMatcher::compile(pattern)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_glob() {
        let matcher = GlobMatcher::compile("/usr/bin/game*").unwrap();
        assert!(matcher.matches("/usr/bin/game2"));
        assert!(matcher.matches("/usr/bin/game"));
        assert!(!matcher.matches("/usr/bin/other"));
    }

    #[test]
    fn test_star_crosses_directories() {
        let matcher = GlobMatcher::compile("*/Stardew Valley").unwrap();
        assert!(matcher.matches("/home/user/.steam/steamapps/common/Stardew Valley/Stardew Valley"));
    }

    #[test]
    fn test_character_class() {
        let matcher = GlobMatcher::compile("/opt/game[0-9]").unwrap();
        assert!(matcher.matches("/opt/game7"));
        assert!(!matcher.matches("/opt/gamex"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = GlobMatcher::compile("/opt/[unclosed").unwrap_err();
        assert_eq!(err.pattern, "/opt/[unclosed");
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn test_compile_glob_returns_shared_matcher() {
        let matcher = compile_glob("C:\\Games\\*.exe").unwrap();
        assert!(matcher.matches("C:\\Games\\game.exe"));
    }
}
