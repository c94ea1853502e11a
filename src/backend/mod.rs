//! Search backend facade
//!
//! Everything the core does to the search engine goes through the
//! [`SearchBackend`] trait: index lifecycle, settings and mappings, aliases,
//! bulk writes, scrolls and shard status. Two implementations ship with the
//! crate:
//!
//! - [`HttpBackend`]: Elasticsearch REST API over `reqwest`
//! - [`InMemoryBackend`]: a process-local cluster for tests and dry runs

mod error;
mod factory;
mod http;
mod memory;
mod types;

pub use error::{BackendError, BackendResult};
pub use factory::create_backend;
pub use http::HttpBackend;
pub use memory::InMemoryBackend;
pub use types::{
    unstarted_copies, AliasAction, BulkSummary, CreateIndexRequest, Document, IndexStatus,
    ScrollPage, ScrollRequest, ShardCopyStatus,
};

use crate::drift::{ConfigTree, FlatSettings};
use async_trait::async_trait;
use std::time::Duration;

/// Typed operations against the search engine
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Whether a physical index with this exact name exists
    async fn index_exists(&self, index: &str) -> BackendResult<bool>;

    /// Lifecycle status of a physical index
    async fn index_status(&self, index: &str) -> BackendResult<IndexStatus>;

    /// Names of all physical indexes (aliases excluded)
    async fn list_indices(&self) -> BackendResult<Vec<String>>;

    async fn create_index(&self, index: &str, request: &CreateIndexRequest) -> BackendResult<()>;

    async fn delete_index(&self, index: &str) -> BackendResult<()>;

    async fn open_index(&self, index: &str) -> BackendResult<()>;

    async fn close_index(&self, index: &str) -> BackendResult<()>;

    /// Live settings, flattened to `index.*` keys
    async fn get_settings(&self, index: &str) -> BackendResult<FlatSettings>;

    /// Apply settings given relative to `index.`
    async fn set_settings(&self, index: &str, settings: &ConfigTree) -> BackendResult<()>;

    async fn get_mapping(&self, index: &str) -> BackendResult<ConfigTree>;

    async fn set_mapping(&self, index: &str, mapping: &ConfigTree) -> BackendResult<()>;

    /// Physical indexes currently holding `alias`; empty if nobody holds it
    async fn indices_with_alias(&self, alias: &str) -> BackendResult<Vec<String>>;

    /// Apply all actions as one atomic request
    async fn update_aliases(&self, actions: &[AliasAction]) -> BackendResult<()>;

    /// Write documents with create semantics; an existing id is an error
    async fn bulk_create(&self, index: &str, documents: &[Document]) -> BackendResult<BulkSummary>;

    /// Open a scroll and return its first batch
    async fn open_scroll(&self, index: &str, request: &ScrollRequest) -> BackendResult<ScrollPage>;

    /// Fetch the next batch of an open scroll, extending its window
    async fn fetch_next(&self, scroll_id: &str, window: Duration) -> BackendResult<ScrollPage>;

    async fn clear_scroll(&self, scroll_id: &str) -> BackendResult<()>;

    /// Document count of an index or alias
    async fn count_documents(&self, index: &str) -> BackendResult<u64>;

    /// Make recent writes visible to search and count
    async fn refresh(&self, index: &str) -> BackendResult<()>;

    /// Merge segments down to at most `max_num_segments`
    async fn optimize(&self, index: &str, max_num_segments: u32) -> BackendResult<()>;

    /// Status of every shard copy of the index
    async fn shard_status(&self, index: &str) -> BackendResult<Vec<ShardCopyStatus>>;

    /// Bind `alias` to `index`. With `exclusive`, every other holder loses the
    /// alias in the same request.
    async fn add_alias(&self, alias: &str, index: &str, exclusive: bool) -> BackendResult<()> {
        let mut actions = Vec::new();
        if exclusive {
            for holder in self.indices_with_alias(alias).await? {
                if holder != index {
                    actions.push(AliasAction::remove(alias, holder));
                }
            }
        }
        actions.push(AliasAction::add(alias, index));
        self.update_aliases(&actions).await
    }

    /// Add `alias` to `add_index` and remove it from `remove_indexes`, atomically.
    async fn swap_alias(
        &self,
        alias: &str,
        add_index: &str,
        remove_indexes: &[String],
    ) -> BackendResult<()> {
        let mut actions = vec![AliasAction::add(alias, add_index)];
        actions.extend(
            remove_indexes
                .iter()
                .filter(|index| index.as_str() != add_index)
                .map(|index| AliasAction::remove(alias, index.clone())),
        );
        self.update_aliases(&actions).await
    }
}
