//! Prometheus metrics for convergence and reindex runs
//!
//! The tool is a short-lived batch process, so nothing scrapes it directly.
//! When a textfile path is configured the registry is rendered there on exit,
//! for node-exporter's textfile collector to pick up.
//!
//! ```no_run
//! use search_index_manager::metrics::INDEX_METRICS;
//!
//! INDEX_METRICS
//!     .drift_detected
//!     .with_label_values(&["content", "analyzers"])
//!     .inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::path::Path;

/// Index lifecycle metrics
pub struct IndexMetrics {
    registry: Registry,

    /// Sections found out of line with the desired state
    pub drift_detected: CounterVec,

    /// Corrections applied to a live index
    pub corrections_applied: CounterVec,

    /// Drift reported and left uncorrected
    pub uncorrected_issues: CounterVec,

    /// Documents copied per reindex worker
    pub documents_reindexed: CounterVec,

    /// Reindex duration by outcome
    pub reindex_duration: HistogramVec,

    /// Last measured source/destination count deviation
    pub count_deviation: GaugeVec,

    /// Shard copies not yet started, as of the last poll
    pub unstarted_shards: GaugeVec,

    /// Atomic alias updates issued
    pub alias_updates: CounterVec,
}

impl IndexMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let drift_detected = CounterVec::new(
            Opts::new(
                "search_index_drift_detected_total",
                "Configuration sections that differ from the desired state",
            ),
            &["index_type", "section"],
        )?;
        let corrections_applied = CounterVec::new(
            Opts::new(
                "search_index_corrections_applied_total",
                "Corrections applied to live indexes",
            ),
            &["index_type", "section"],
        )?;
        let uncorrected_issues = CounterVec::new(
            Opts::new(
                "search_index_uncorrected_issues_total",
                "Drift reported without correction",
            ),
            &["index_type", "kind"],
        )?;
        let documents_reindexed = CounterVec::new(
            Opts::new(
                "search_index_documents_reindexed_total",
                "Documents copied by reindex workers",
            ),
            &["worker"],
        )?;
        let reindex_duration = HistogramVec::new(
            HistogramOpts::new(
                "search_index_reindex_duration_seconds",
                "Wall time of reindex runs",
            )
            .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 21600.0]),
            &["outcome"],
        )?;
        let count_deviation = GaugeVec::new(
            Opts::new(
                "search_index_count_deviation_ratio",
                "Fractional document count difference after reindex",
            ),
            &["index"],
        )?;
        let unstarted_shards = GaugeVec::new(
            Opts::new(
                "search_index_unstarted_shards",
                "Shard copies not in the started state",
            ),
            &["index"],
        )?;
        let alias_updates = CounterVec::new(
            Opts::new(
                "search_index_alias_updates_total",
                "Atomic alias update requests",
            ),
            &["alias"],
        )?;

        registry.register(Box::new(drift_detected.clone()))?;
        registry.register(Box::new(corrections_applied.clone()))?;
        registry.register(Box::new(uncorrected_issues.clone()))?;
        registry.register(Box::new(documents_reindexed.clone()))?;
        registry.register(Box::new(reindex_duration.clone()))?;
        registry.register(Box::new(count_deviation.clone()))?;
        registry.register(Box::new(unstarted_shards.clone()))?;
        registry.register(Box::new(alias_updates.clone()))?;

        Ok(Self {
            registry,
            drift_detected,
            corrections_applied,
            uncorrected_issues,
            documents_reindexed,
            reindex_duration,
            count_deviation,
            unstarted_shards,
            alias_updates,
        })
    }

    /// Record a finished reindex attempt
    pub fn record_reindex(&self, outcome: &str, duration_secs: f64) {
        self.reindex_duration
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

lazy_static! {
    /// Global index metrics instance
    pub static ref INDEX_METRICS: IndexMetrics =
        IndexMetrics::new().expect("index metric definitions are valid");
}

/// Render all metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = INDEX_METRICS.registry().gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Write the rendered metrics to `path`, replacing it atomically.
pub fn write_textfile(path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, gather_metrics())?;
    std::fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), "Metrics textfile written");
    Ok(())
}
