//! Drift detection between desired and live index configuration
//!
//! Desired documents (analysis settings, mappings) are typed [`ConfigTree`]s.
//! Live settings come back from the backend as loosely-typed values and are
//! compared through a flat `dotted.key` view ([`FlatSettings`]); live mappings
//! are compared tree to tree. All leaf comparisons use [`Scalar::loosely_eq`].

mod detector;
mod tree;

pub use detector::{
    analysis_verdict, inspect, mapping_matches, mapping_verdict, scalar_verdict, settings_match,
    DriftReport, Verdict, ANALYSIS_PREFIX, REPLICAS_KEY, SHARDS_KEY,
};
pub use tree::{ConfigTree, ConfigValue, FlatSettings, Scalar};
