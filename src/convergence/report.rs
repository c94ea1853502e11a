//! Outcome of a convergence run

use crate::metrics::INDEX_METRICS;
use serde::Serialize;
use strum::Display;
use tracing::{error, info};

/// Steps of the convergence state machine, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    EnsureIndex,
    ValidateSettings,
    ValidateAnalyzers,
    ValidateMapping,
    ValidateAlias,
    Reopen,
}

/// Configuration section a correction or issue concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Section {
    Index,
    Shards,
    Replicas,
    Analyzers,
    Mapping,
    SpecificAlias,
    GlobalAlias,
}

/// A change this run applied to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correction {
    Created { index: String, replicas: u32, rebuilt: bool },
    ReplicasUpdated { from: Option<u32>, to: u32 },
    AnalyzersUpdated,
    MappingUpdated,
    SpecificAliasBound { alias: String },
    Migrated { alias: String, from: Vec<String>, documents: u64 },
    GlobalAliasBound { alias: String },
    StaleIndexesRemoved { indexes: Vec<String> },
    Reopened,
}

impl Correction {
    pub fn section(&self) -> Section {
        match self {
            Correction::Created { .. } | Correction::StaleIndexesRemoved { .. } | Correction::Reopened => {
                Section::Index
            }
            Correction::ReplicasUpdated { .. } => Section::Replicas,
            Correction::AnalyzersUpdated => Section::Analyzers,
            Correction::MappingUpdated => Section::Mapping,
            Correction::SpecificAliasBound { .. } | Correction::Migrated { .. } => {
                Section::SpecificAlias
            }
            Correction::GlobalAliasBound { .. } => Section::GlobalAlias,
        }
    }
}

/// Drift that was reported and left in place
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    #[error(
        "Number of shards is {} but should be {desired} and cannot be changed without a rebuild. \
         Run again with --rebuild or --reindex-and-remove-ok to fix it.",
        .actual.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string())
    )]
    ShardCountMismatch { actual: Option<u32>, desired: u32 },

    #[error(
        "Analyzers differ and the index has to be closed, modified and reopened to correct them. \
         Run again with --close-ok to allow it; the index is unusable while closed."
    )]
    CloseDenied,

    #[error("Couldn't update mappings. The backend said: {reason}")]
    MappingRejected { reason: String },

    #[error(
        "Alias {alias} is held by {} which might be serving queries. \
         Run again with --reindex-and-remove-ok to migrate it.",
        .holders.join(", ")
    )]
    AliasHeldElsewhere { alias: String, holders: Vec<String> },
}

impl Issue {
    pub fn section(&self) -> Section {
        match self {
            Issue::ShardCountMismatch { .. } => Section::Shards,
            Issue::CloseDenied => Section::Analyzers,
            Issue::MappingRejected { .. } => Section::Mapping,
            Issue::AliasHeldElsewhere { .. } => Section::SpecificAlias,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Issue::ShardCountMismatch { .. } => "shard_count_mismatch",
            Issue::CloseDenied => "close_denied",
            Issue::MappingRejected { .. } => "mapping_rejected",
            Issue::AliasHeldElsewhere { .. } => "alias_held_elsewhere",
        }
    }
}

/// Everything a run changed and everything it could not
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub index_type: String,
    pub index: String,
    pub corrections: Vec<Correction>,
    pub issues: Vec<Issue>,
}

impl RunReport {
    pub fn new(index_type: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            index_type: index_type.into(),
            index: index.into(),
            corrections: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub(crate) fn drift(&self, section: Section) {
        info!(index = %self.index, section = %section, "Drift detected");
        INDEX_METRICS
            .drift_detected
            .with_label_values(&[&self.index_type, &section.to_string()])
            .inc();
    }

    pub(crate) fn correct(&mut self, correction: Correction) {
        let section = correction.section();
        info!(index = %self.index, section = %section, correction = ?correction, "Corrected");
        INDEX_METRICS
            .corrections_applied
            .with_label_values(&[&self.index_type, &section.to_string()])
            .inc();
        self.corrections.push(correction);
    }

    pub(crate) fn report(&mut self, issue: Issue) {
        error!(index = %self.index, section = %issue.section(), "{}", issue);
        INDEX_METRICS
            .uncorrected_issues
            .with_label_values(&[&self.index_type, issue.kind()])
            .inc();
        self.issues.push(issue);
    }

    /// Fully converged: nothing was left uncorrected
    pub fn is_converged(&self) -> bool {
        self.issues.is_empty()
    }

    /// 0 when converged, 1 when any drift was left in place
    pub fn exit_code(&self) -> i32 {
        if self.is_converged() {
            0
        } else {
            1
        }
    }
}
