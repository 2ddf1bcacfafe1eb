//! Lock-free progress counters shared by the pipeline workers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Instant;

/// Log a progress line every this many finished blocks.
pub const LOG_INTERVAL: u64 = 10_000;

pub struct Progress {
    processed: AtomicU64,
    failed: AtomicU64,
    started_at: Instant,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_processed(&self) {
        let done = self.processed.fetch_add(1, Relaxed) + 1;
        self.maybe_log(done);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Relaxed);
        let done = self.processed.fetch_add(1, Relaxed) + 1;
        self.maybe_log(done);
    }

    fn maybe_log(&self, done: u64) {
        if done % LOG_INTERVAL == 0 {
            tracing::info!(
                "Processed {} blocks ({} failed) in {:.1}s",
                done,
                self.failed.load(Relaxed),
                self.started_at.elapsed().as_secs_f64()
            );
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
            processed: self.processed.load(Relaxed),
            failed: self.failed.load(Relaxed),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressSnapshot {
    pub elapsed_secs: f64,
    /// Blocks taken off the queue, including failed ones.
    pub processed: u64,
    pub failed: u64,
}
