//! Matching loaded rules against the process snapshot.

use crate::models::{ActiveRule, Config, Monitor};
use crate::services::processes::ProcessSnapshot;
use std::collections::BTreeMap;

/// Rules whose game is running and the savegame globs to poll for them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleMatch {
    pub active: BTreeMap<String, ActiveRule>,
    /// One entry per savegame pattern of each active rule, rules in key
    /// order and patterns in file order
    pub monitors: Vec<Monitor>,
}

/// Decide which of `rules` are running.
///
/// Rules disabled in `config` never become active.
pub fn match_rules(
    rules: &BTreeMap<String, ActiveRule>,
    snapshot: &ProcessSnapshot,
    config: &Config,
) -> RuleMatch {
    let mut result = RuleMatch::default();

    for (key, rule) in rules {
        if config.is_rule_disabled(key) {
            continue;
        }
        if !rule.is_running(snapshot.iter()) {
            continue;
        }

        result.monitors.extend(rule.platform.savegames.iter().map(|path| Monitor {
            path: path.clone(),
            rule_key: key.clone(),
        }));
        result.active.insert(key.clone(), rule.clone());
    }

    result
}
