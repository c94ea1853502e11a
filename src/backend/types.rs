//! Value types exchanged with the search backend

use crate::drift::ConfigTree;
use crate::reindex::Partition;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::Display;

/// Lifecycle status of a physical index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IndexStatus {
    Missing,
    Closed,
    Open,
}

/// Body of a create-index request
#[derive(Debug, Clone, Serialize)]
pub struct CreateIndexRequest {
    pub shards: u32,
    pub replicas: u32,
    /// Analysis document placed under `settings.analysis`
    pub analysis: ConfigTree,
    /// Additional index-level settings merged into `settings`
    pub extra_settings: ConfigTree,
}

/// Translog size that triggers a flush on newly created indexes
const TRANSLOG_FLUSH_THRESHOLD: &str = "512mb";

impl CreateIndexRequest {
    /// Request with the index-level defaults every managed index is created with
    pub fn new(shards: u32, replicas: u32, analysis: ConfigTree) -> Self {
        Self {
            shards,
            replicas,
            analysis,
            extra_settings: ConfigTree::new().with(
                "translog",
                ConfigTree::new().with("flush_threshold_size", TRANSLOG_FLUSH_THRESHOLD),
            ),
        }
    }

    /// Settings tree as sent to the backend (relative to `index.`)
    pub fn settings(&self) -> ConfigTree {
        let mut settings = ConfigTree::new()
            .with("number_of_shards", self.shards)
            .with("number_of_replicas", self.replicas);
        if !self.analysis.is_empty() {
            settings.insert("analysis", self.analysis.clone());
        }
        settings.merge(&self.extra_settings);
        settings
    }
}

/// One source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source: serde_json::Value,
}

impl Document {
    pub fn new(id: impl Into<String>, source: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// Parameters for opening a scroll cursor over an index or alias
#[derive(Debug, Clone)]
pub struct ScrollRequest {
    /// Documents per shard per batch
    pub batch_size: usize,
    /// How long the cursor stays alive between fetches
    pub window: Duration,
    /// Restrict the scroll to one partition of the id space
    pub partition: Option<Partition>,
}

/// One batch of a scroll
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    /// Cursor for the next fetch; `None` once the backend has nothing left
    pub scroll_id: Option<String>,
    /// Total documents matched by the scroll query
    pub total: u64,
    pub documents: Vec<Document>,
}

/// Outcome of a bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub written: usize,
    /// Engine-side processing time reported by the backend
    pub took_ms: u64,
}

/// One alias action inside an atomic alias update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

impl AliasAction {
    pub fn add(alias: impl Into<String>, index: impl Into<String>) -> Self {
        AliasAction::Add {
            index: index.into(),
            alias: alias.into(),
        }
    }

    pub fn remove(alias: impl Into<String>, index: impl Into<String>) -> Self {
        AliasAction::Remove {
            index: index.into(),
            alias: alias.into(),
        }
    }
}

/// State of one shard copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCopyStatus {
    pub shard: u32,
    pub primary: bool,
    pub state: String,
}

impl ShardCopyStatus {
    pub fn is_started(&self) -> bool {
        self.state == "STARTED"
    }
}

/// Count shard copies that are not started yet
pub fn unstarted_copies(status: &[ShardCopyStatus]) -> usize {
    status.iter().filter(|copy| !copy.is_started()).count()
}
