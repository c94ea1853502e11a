use crate::backend::{unstarted_copies, AliasAction, BackendResult, SearchBackend};
use crate::metrics::INDEX_METRICS;
use crate::naming::IndexNames;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Polling parameters for the shard-started wait
#[derive(Debug, Clone, Copy)]
pub struct ShardWait {
    pub interval: Duration,
    /// Log the outstanding count every this many polls
    pub log_every: u32,
}

/// Alias moves and the cleanup that follows them
pub struct AliasSwapper {
    backend: Arc<dyn SearchBackend>,
}

impl AliasSwapper {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Point `alias` at `index` alone, in one request.
    ///
    /// Returns the indexes that held the alias before, which are now stale.
    pub async fn swap_specific(&self, alias: &str, index: &str) -> BackendResult<Vec<String>> {
        let previous: Vec<String> = self
            .backend
            .indices_with_alias(alias)
            .await?
            .into_iter()
            .filter(|holder| holder != index)
            .collect();

        info!(alias, index, previous = ?previous, "Swapping alias");
        self.backend.swap_alias(alias, index, &previous).await?;
        INDEX_METRICS.alias_updates.with_label_values(&[alias]).inc();
        Ok(previous)
    }

    /// Make `index` the holder of the global alias for its type.
    ///
    /// Other holders are dropped in the same request when they are `stale` or
    /// are physical indexes of the same type according to `names`. Returns
    /// whether a request was needed.
    pub async fn bind_global(
        &self,
        names: &IndexNames,
        index: &str,
        stale: &[String],
    ) -> BackendResult<bool> {
        let alias = names.global_alias();
        let holders = self.backend.indices_with_alias(alias).await?;
        let superseded: Vec<&String> = holders
            .iter()
            .filter(|holder| holder.as_str() != index)
            .filter(|holder| stale.contains(holder) || names.owns(holder))
            .collect();

        if holders.iter().any(|holder| holder == index) && superseded.is_empty() {
            return Ok(false);
        }

        let mut actions = vec![AliasAction::add(alias, index)];
        actions.extend(superseded.iter().map(|holder| AliasAction::remove(alias, holder.as_str())));
        info!(alias, index, superseded = ?superseded, "Binding global alias");
        self.backend.update_aliases(&actions).await?;
        INDEX_METRICS.alias_updates.with_label_values(&[alias]).inc();
        Ok(true)
    }

    /// Delete indexes displaced by a swap. Failures are logged and skipped;
    /// the alias has already moved. Returns the indexes actually deleted.
    pub async fn remove_stale(&self, stale: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        for index in stale {
            match self.backend.delete_index(index).await {
                Ok(()) => {
                    info!(index = %index, "Removed old index");
                    removed.push(index.clone());
                }
                Err(e) => warn!(index = %index, error = %e, "Failed to remove old index"),
            }
        }
        removed
    }

    /// Merge the index down to `max_num_segments` segments
    pub async fn optimize(&self, index: &str, max_num_segments: u32) -> BackendResult<()> {
        info!(index, max_num_segments, "Optimizing index");
        self.backend.optimize(index, max_num_segments).await
    }

    /// Poll until every shard copy of `index` is started. The poll has no upper bound.
    pub async fn wait_for_shards(&self, index: &str, wait: ShardWait) -> BackendResult<()> {
        let gauge = INDEX_METRICS.unstarted_shards.with_label_values(&[index]);
        let mut polls: u32 = 0;
        loop {
            let unstarted = unstarted_copies(&self.backend.shard_status(index).await?);
            gauge.set(unstarted as f64);
            if unstarted == 0 {
                info!(index, polls, "All shard copies started");
                return Ok(());
            }
            if wait.log_every > 0 && polls % wait.log_every == 0 {
                info!(index, unstarted, "Waiting for shard copies to start");
            }
            polls += 1;
            tokio::time::sleep(wait.interval).await;
        }
    }
}
