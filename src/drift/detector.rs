//! Drift detection between desired configuration and live index state

use super::tree::{ConfigTree, ConfigValue, FlatSettings, Scalar};
use serde::Serialize;
use strum::Display;

/// Per-section comparison result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    Match,
    Differs,
}

impl Verdict {
    fn of(matches: bool) -> Self {
        if matches {
            Verdict::Match
        } else {
            Verdict::Differs
        }
    }

    pub fn is_match(self) -> bool {
        self == Verdict::Match
    }
}

/// Verdict for each configuration section of one physical index
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub shards: Verdict,
    pub replicas: Verdict,
    pub analyzers: Verdict,
    pub mapping: Verdict,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        [self.shards, self.replicas, self.analyzers, self.mapping]
            .iter()
            .all(|v| v.is_match())
    }
}

/// Settings key holding the shard count
pub const SHARDS_KEY: &str = "index.number_of_shards";
/// Settings key holding the replica count
pub const REPLICAS_KEY: &str = "index.number_of_replicas";
/// Settings prefix the analysis document lives under
pub const ANALYSIS_PREFIX: &str = "index.analysis";

/// Check every leaf of `desired` against the flat live settings.
///
/// Each desired key is looked up as `prefix.key` (nested trees extend the
/// prefix). A missing live key or a loosely-unequal value is a mismatch and
/// short-circuits; live keys absent from `desired` are ignored.
pub fn settings_match(prefix: &str, live: &FlatSettings, desired: &ConfigTree) -> bool {
    for (key, value) in desired.iter() {
        let settings_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            ConfigValue::Tree(child) => {
                if !settings_match(&settings_key, live, child) {
                    return false;
                }
            }
            leaf => match live.get(&settings_key) {
                Some(actual) if actual.loosely_eq(leaf) => {}
                _ => return false,
            },
        }
    }
    true
}

/// Check a live mapping subtree against the desired one.
///
/// Keys missing on the live side are mismatches, a desired subtree facing a
/// live leaf is a mismatch, extra live keys are ignored (mapping updates are
/// additive only).
pub fn mapping_matches(actual: &ConfigTree, desired: &ConfigTree) -> bool {
    for (key, value) in desired.iter() {
        let Some(live) = actual.get(key) else {
            return false;
        };
        match value {
            ConfigValue::Tree(child) => match live.as_tree() {
                Some(live_child) if mapping_matches(live_child, child) => {}
                _ => return false,
            },
            leaf => {
                if !live.loosely_eq(leaf) {
                    return false;
                }
            }
        }
    }
    true
}

pub fn scalar_verdict(live: &FlatSettings, key: &str, desired: impl Into<Scalar>) -> Verdict {
    let desired = desired.into();
    Verdict::of(matches!(
        live.get(key).and_then(|v| v.as_scalar()),
        Some(actual) if actual.loosely_eq(&desired)
    ))
}

pub fn analysis_verdict(live: &FlatSettings, desired_analysis: &ConfigTree) -> Verdict {
    Verdict::of(settings_match(ANALYSIS_PREFIX, live, desired_analysis))
}

pub fn mapping_verdict(live_mapping: &ConfigTree, desired_mapping: &ConfigTree) -> Verdict {
    Verdict::of(mapping_matches(live_mapping, desired_mapping))
}

/// Compare all sections at once.
pub fn inspect(
    live_settings: &FlatSettings,
    live_mapping: &ConfigTree,
    shards: u32,
    replicas: u32,
    desired_analysis: &ConfigTree,
    desired_mapping: &ConfigTree,
) -> DriftReport {
    DriftReport {
        shards: scalar_verdict(live_settings, SHARDS_KEY, shards),
        replicas: scalar_verdict(live_settings, REPLICAS_KEY, replicas),
        analyzers: analysis_verdict(live_settings, desired_analysis),
        mapping: mapping_verdict(live_mapping, desired_mapping),
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Scalar::Int(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn live(value: serde_json::Value) -> FlatSettings {
        FlatSettings::from_nested(&ConfigTree::from_json(value).unwrap())
    }

    fn tree(value: serde_json::Value) -> ConfigTree {
        ConfigTree::from_json(value).unwrap()
    }

    #[test]
    fn test_settings_match_with_coercion() {
        let live = live(json!({"index": {"analysis": {"filter": {"shingle": {"max_shingle_size": "3"}}}}}));
        let desired = tree(json!({"filter": {"shingle": {"max_shingle_size": 3}}}));
        assert!(settings_match(ANALYSIS_PREFIX, &live, &desired));
    }

    #[test]
    fn test_settings_extra_live_keys_ignored() {
        let live = live(json!({"index": {"analysis": {"analyzer": {
            "plain": {"type": "custom", "tokenizer": "standard"},
            "legacy": {"type": "custom"}
        }}}}));
        let desired = tree(json!({"analyzer": {"plain": {"tokenizer": "standard"}}}));
        assert!(settings_match(ANALYSIS_PREFIX, &live, &desired));
    }

    #[test]
    fn test_settings_missing_key_is_mismatch() {
        let live = live(json!({"index": {"analysis": {}}}));
        let desired = tree(json!({"analyzer": {"plain": {"tokenizer": "standard"}}}));
        assert!(!settings_match(ANALYSIS_PREFIX, &live, &desired));
    }

    #[test]
    fn test_settings_list_compared_element_wise() {
        let live = live(json!({"index": {"analysis": {"analyzer": {"plain": {"filter": ["lowercase", "asciifolding"]}}}}}));
        let same = tree(json!({"analyzer": {"plain": {"filter": ["lowercase", "asciifolding"]}}}));
        let reordered = tree(json!({"analyzer": {"plain": {"filter": ["asciifolding", "lowercase"]}}}));
        assert!(settings_match(ANALYSIS_PREFIX, &live, &same));
        assert!(!settings_match(ANALYSIS_PREFIX, &live, &reordered));
    }

    #[test]
    fn test_mapping_match_is_additive() {
        let actual = tree(json!({"properties": {
            "title": {"type": "text", "analyzer": "text", "norms": true},
            "legacy": {"type": "keyword"}
        }}));
        let desired = tree(json!({"properties": {"title": {"type": "text", "analyzer": "text"}}}));
        assert!(mapping_matches(&actual, &desired));

        let added_field = tree(json!({"properties": {"heading": {"type": "text"}}}));
        assert!(!mapping_matches(&actual, &added_field));
    }

    #[test]
    fn test_mapping_subtree_against_leaf_is_mismatch() {
        let actual = tree(json!({"properties": {"title": "text"}}));
        let desired = tree(json!({"properties": {"title": {"type": "text"}}}));
        assert!(!mapping_matches(&actual, &desired));
    }

    #[test]
    fn test_inspect_reports_per_section() {
        let settings = live(json!({"index": {"number_of_shards": "5", "number_of_replicas": "1"}}));
        let report = inspect(&settings, &ConfigTree::new(), 10, 1, &ConfigTree::new(), &ConfigTree::new());
        assert_eq!(report.shards, Verdict::Differs);
        assert_eq!(report.replicas, Verdict::Match);
        assert_eq!(report.analyzers, Verdict::Match);
        assert_eq!(report.mapping, Verdict::Match);
        assert!(!report.is_clean());
        assert_eq!(report.shards.to_string(), "differs");
    }
}
