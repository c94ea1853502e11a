//! Shared fixtures for the integration tests

#![allow(dead_code)]

use search_index_manager::backend::{Document, InMemoryBackend};
use search_index_manager::config::{IndexTypeSpec, ReindexConfig};
use search_index_manager::desired::StaticProvider;
use search_index_manager::drift::ConfigTree;
use search_index_manager::{ConvergenceEngine, IndexNames};
use serde_json::json;
use std::sync::Arc;

pub const BASE: &str = "wiki";
pub const TYPE: &str = "content";
pub const ALIAS: &str = "wiki_content";

/// Small analysis document with one custom analyzer
pub fn analysis() -> ConfigTree {
    ConfigTree::from_json(json!({
        "analyzer": {
            "plain": {
                "type": "custom",
                "tokenizer": "standard",
                "filter": ["lowercase"]
            }
        }
    }))
    .unwrap()
}

/// Same analyzer with a different tokenizer
pub fn other_analysis() -> ConfigTree {
    ConfigTree::from_json(json!({
        "analyzer": {
            "plain": {
                "type": "custom",
                "tokenizer": "whitespace",
                "filter": ["lowercase"]
            }
        }
    }))
    .unwrap()
}

pub fn mapping() -> ConfigTree {
    ConfigTree::from_json(json!({
        "dynamic": false,
        "properties": {
            "title": {"type": "text", "analyzer": "plain"},
            "namespace": {"type": "long"}
        }
    }))
    .unwrap()
}

pub fn fast_reindex() -> ReindexConfig {
    ReindexConfig {
        scroll_window_secs: 60,
        shard_poll_interval_ms: 1,
        shard_poll_log_every: 1,
        optimize_max_segments: 5,
    }
}

pub fn spec(shards: u32, replicas: u32) -> IndexTypeSpec {
    IndexTypeSpec {
        chunk_size: 10,
        reindex_workers: 3,
        acceptable_count_deviation: 0.05,
        ..IndexTypeSpec::new(shards, replicas)
    }
}

pub fn engine(backend: &Arc<InMemoryBackend>, spec: IndexTypeSpec) -> ConvergenceEngine {
    engine_named(backend, spec, IndexNames::new(BASE, TYPE))
}

/// Engine for `TYPE` in a cluster that also hosts `others`
pub fn engine_among(backend: &Arc<InMemoryBackend>, spec: IndexTypeSpec, others: &[&str]) -> ConvergenceEngine {
    let names = IndexNames::new(BASE, TYPE).with_other_types(others.iter().copied());
    engine_named(backend, spec, names)
}

fn engine_named(backend: &Arc<InMemoryBackend>, spec: IndexTypeSpec, names: IndexNames) -> ConvergenceEngine {
    ConvergenceEngine::new(
        backend.clone(),
        Arc::new(StaticProvider::new(analysis(), mapping())),
        names,
        spec,
        fast_reindex(),
    )
}

pub fn documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|n| {
            Document::new(
                format!("page-{}", n),
                json!({"title": format!("Page {}", n), "namespace": 0}),
            )
        })
        .collect()
}

/// An index already matching the desired state and holding both aliases
pub fn seed_converged(backend: &InMemoryBackend, index: &str, shards: u32, replicas: u32, docs: usize) {
    backend.seed_index(index, shards, replicas, analysis(), mapping());
    backend.seed_documents(index, documents(docs));
    backend.seed_alias(ALIAS, index);
    backend.seed_alias(BASE, index);
}
