use super::{Partition, Progress, ReindexError};
use crate::backend::{BackendError, Document, ScrollRequest, SearchBackend};
use crate::drift::ConfigTree;
use crate::metrics::INDEX_METRICS;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// One copy from `source` into `destination`
#[derive(Debug, Clone)]
pub struct ReindexJob {
    /// Index or alias to read from
    pub source: String,
    /// Physical index to write into
    pub destination: String,
    pub workers: u32,
    /// Documents per bulk request, across all shards
    pub chunk_size: usize,
    /// Shard count of the destination; divides `chunk_size` into the per-shard scroll size
    pub shards: u32,
    pub acceptable_count_deviation: f64,
}

impl ReindexJob {
    fn scroll_batch_size(&self) -> usize {
        (self.chunk_size / self.shards.max(1) as usize).max(1)
    }
}

/// Verified result of a completed copy
#[derive(Debug, Clone, PartialEq)]
pub struct ReindexOutcome {
    pub documents_written: u64,
    pub source_count: u64,
    pub destination_count: u64,
    pub deviation: f64,
    pub elapsed: Duration,
}

/// `|old - new| / old`, or 0 when the source is empty
pub fn count_deviation(source_count: u64, destination_count: u64) -> f64 {
    if source_count == 0 {
        return 0.0;
    }
    source_count.abs_diff(destination_count) as f64 / source_count as f64
}

/// Drives parallel copies against a backend
pub struct Reindexer {
    backend: Arc<dyn SearchBackend>,
    scroll_window: Duration,
}

impl Reindexer {
    pub fn new(backend: Arc<dyn SearchBackend>, scroll_window: Duration) -> Self {
        Self {
            backend,
            scroll_window,
        }
    }

    /// Copy, restore the destination's settings, then verify counts.
    ///
    /// The destination's refresh and merge settings are relaxed for the bulk
    /// phase and restored whatever the copy's outcome.
    pub async fn run(&self, job: &ReindexJob) -> Result<ReindexOutcome, ReindexError> {
        let started = Instant::now();

        info!(
            source = %job.source,
            destination = %job.destination,
            workers = job.workers,
            "Relaxing destination settings for bulk copy"
        );
        self.backend
            .set_settings(&job.destination, &bulk_settings())
            .await?;

        let copied = self.copy_all(job).await;

        let restored = self
            .backend
            .set_settings(&job.destination, &serving_settings())
            .await;
        if let Err(e) = &restored {
            error!(index = %job.destination, error = %e, "Failed to restore destination settings");
        }

        let documents_written = match copied {
            Ok(written) => written,
            Err(e) => {
                INDEX_METRICS.record_reindex("failed", started.elapsed().as_secs_f64());
                return Err(e);
            }
        };
        restored?;

        match self.verify(job, documents_written, started).await {
            Ok(outcome) => {
                INDEX_METRICS.record_reindex("verified", outcome.elapsed.as_secs_f64());
                Ok(outcome)
            }
            Err(e) => {
                INDEX_METRICS.record_reindex("rejected", started.elapsed().as_secs_f64());
                Err(e)
            }
        }
    }

    /// Run every worker to completion; the first failure aborts the rest.
    async fn copy_all(&self, job: &ReindexJob) -> Result<u64, ReindexError> {
        let partitions: Vec<Option<Partition>> = if job.workers > 1 {
            Partition::all(job.workers)?.into_iter().map(Some).collect()
        } else {
            vec![None]
        };

        let mut workers = JoinSet::new();
        for partition in partitions {
            let worker = partition.map(|p| p.worker).unwrap_or(0);
            let backend = Arc::clone(&self.backend);
            let source = job.source.clone();
            let destination = job.destination.clone();
            let request = ScrollRequest {
                batch_size: job.scroll_batch_size(),
                window: self.scroll_window,
                partition,
            };
            workers.spawn(async move {
                let result = copy_partition(backend, &source, &destination, request, worker).await;
                (worker, result)
            });
        }

        let mut written = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(count))) => written += count,
                Ok((worker, Err(source))) => {
                    error!(worker, error = %source, kind = source.kind(), "Reindex worker failed");
                    workers.abort_all();
                    return Err(ReindexError::WorkerFailed { worker, source });
                }
                Err(join_error) if join_error.is_cancelled() => {}
                Err(join_error) => {
                    workers.abort_all();
                    return Err(ReindexError::WorkerPanicked(join_error.to_string()));
                }
            }
        }
        Ok(written)
    }

    async fn verify(
        &self,
        job: &ReindexJob,
        documents_written: u64,
        started: Instant,
    ) -> Result<ReindexOutcome, ReindexError> {
        self.backend.refresh(&job.destination).await?;
        let source_count = self.backend.count_documents(&job.source).await?;
        let destination_count = self.backend.count_documents(&job.destination).await?;
        let deviation = count_deviation(source_count, destination_count);

        INDEX_METRICS
            .count_deviation
            .with_label_values(&[&job.destination])
            .set(deviation);

        if deviation > job.acceptable_count_deviation {
            warn!(
                source = %job.source,
                destination = %job.destination,
                source_count,
                destination_count,
                deviation,
                tolerance = job.acceptable_count_deviation,
                "Document counts deviate beyond tolerance"
            );
            return Err(ReindexError::DeviationExceeded {
                source_count,
                destination_count,
                deviation,
                tolerance: job.acceptable_count_deviation,
            });
        }

        info!(
            source_count,
            destination_count,
            deviation,
            "Verified document counts"
        );
        Ok(ReindexOutcome {
            documents_written,
            source_count,
            destination_count,
            deviation,
            elapsed: started.elapsed(),
        })
    }
}

/// Scroll one partition of `source` and write it to `destination` with create semantics
async fn copy_partition(
    backend: Arc<dyn SearchBackend>,
    source: &str,
    destination: &str,
    request: ScrollRequest,
    worker: u32,
) -> Result<u64, BackendError> {
    let mut page = backend.open_scroll(source, &request).await?;
    let mut progress = Progress::new(worker, page.total);
    info!(worker, total = page.total, "About to reindex {} documents", page.total);

    let worker_label = worker.to_string();
    let result = loop {
        if page.documents.is_empty() {
            break Ok(());
        }

        let documents: Vec<Document> = std::mem::take(&mut page.documents);
        let summary = match backend.bulk_create(destination, &documents).await {
            Ok(summary) => summary,
            Err(e) => break Err(e),
        };
        debug!(worker, took_ms = summary.took_ms, "Bulk write completed");
        INDEX_METRICS
            .documents_reindexed
            .with_label_values(&[&worker_label])
            .inc_by(summary.written as f64);
        progress.record_batch(summary.written);

        let Some(scroll_id) = page.scroll_id.clone() else {
            break Ok(());
        };
        page = match backend.fetch_next(&scroll_id, request.window).await {
            Ok(next) => next,
            Err(e) => break Err(e),
        };
    };

    if let Some(scroll_id) = &page.scroll_id {
        if let Err(e) = backend.clear_scroll(scroll_id).await {
            debug!(worker, error = %e, "Failed to clear scroll");
        }
    }

    result?;
    info!(worker, completed = progress.completed(), elapsed_ms = progress.elapsed().as_millis() as u64, "All done");
    Ok(progress.completed())
}

/// Settings applied to the destination while the copy runs
pub(crate) fn bulk_settings() -> ConfigTree {
    ConfigTree::new().with("refresh_interval", "-1").with(
        "merge",
        ConfigTree::new().with("policy", ConfigTree::new().with("segments_per_tier", 20i64)),
    )
}

/// Settings restored once the copy is over
pub(crate) fn serving_settings() -> ConfigTree {
    ConfigTree::new().with("refresh_interval", "1s").with(
        "merge",
        ConfigTree::new().with("policy", ConfigTree::new().with("segments_per_tier", 10i64)),
    )
}
