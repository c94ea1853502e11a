use std::time::{Duration, Instant};

/// Running totals of one reindex worker
#[derive(Debug, Clone)]
pub struct Progress {
    worker: u32,
    total: u64,
    completed: u64,
    started: Instant,
}

impl Progress {
    pub fn new(worker: u32, total: u64) -> Self {
        Self {
            worker,
            total,
            completed: 0,
            started: Instant::now(),
        }
    }

    /// Account for a written batch and log the running rate
    pub fn record_batch(&mut self, written: usize) {
        self.completed += written as u64;
        let rate = self.rate();
        tracing::info!(
            worker = self.worker,
            completed = self.completed,
            total = self.total,
            rate,
            "Reindexed {}/{} documents at {}/second",
            self.completed,
            self.total,
            rate
        );
    }

    /// Documents per second since the worker started, rounded
    pub fn rate(&self) -> u64 {
        rate_of(self.completed, self.started.elapsed())
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

fn rate_of(completed: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return completed;
    }
    (completed as f64 / secs).round() as u64
}
