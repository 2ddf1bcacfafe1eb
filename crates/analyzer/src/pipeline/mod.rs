//! One-shot batch job over every stored block in a region.
//!
//! A single producer drives [`BlockStorage::scan_region`] and pushes raw
//! blobs into a bounded queue; a fixed pool of blocking workers decodes
//! them and folds each block into a private [`BlockVisitor`]. Once the
//! scan returns the queue closes, workers drain it, and their visitors are
//! merged on the calling task.
//!
//! Decode failures are per-block: they are logged, counted in a
//! [`FailureSummary`] and never stop the run. Only a storage failure is
//! fatal, and it is reported after the workers have drained.

pub mod progress;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;

use lopater_engine::mapblock::{self, DecodeError, MapBlock};
use lopater_engine::world::position::{Position, Region};

use crate::storage::{BlockStorage, ScanSummary, StorageError};

use progress::{Progress, ProgressSnapshot};

/// Failure samples kept per run.
pub const MAX_FAILURE_SAMPLES: usize = 10;

/// Per-worker accumulator folded over decoded blocks.
///
/// `merge` must be associative and commutative so the merged result does
/// not depend on how blocks were spread across workers.
pub trait BlockVisitor: Default + Send + 'static {
    fn visit(&mut self, pos: Position, block: &MapBlock);

    fn merge(self, other: Self) -> Self;
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Worker threads decoding blocks. Clamped to at least one.
    pub workers: usize,
    /// Raw blocks buffered between the scan and the workers.
    pub queue_capacity: usize,
    pub region: Region,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 4096,
            region: Region::WORLD,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("region scan failed: {0}")]
    Storage(#[from] StorageError),

    #[error("worker failed: {0}")]
    Worker(String),
}

/// A block that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FailureSample {
    #[serde(serialize_with = "serialize_position")]
    pub position: Position,
    pub reason: String,
}

fn serialize_position<S: Serializer>(pos: &Position, s: S) -> Result<S::Ok, S::Error> {
    [pos.x, pos.y, pos.z].serialize(s)
}

/// Decode failures of a run: totals, counts per [`DecodeError::kind`] and
/// the samples with the smallest positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub count: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub samples: Vec<FailureSample>,
}

impl FailureSummary {
    pub fn record(&mut self, pos: Position, err: &DecodeError) {
        self.count += 1;
        *self.by_kind.entry(err.kind().to_string()).or_default() += 1;

        let sample = FailureSample {
            position: pos,
            reason: err.to_string(),
        };
        let at = self.samples.binary_search(&sample).unwrap_or_else(|i| i);
        if at < MAX_FAILURE_SAMPLES {
            self.samples.insert(at, sample);
            self.samples.truncate(MAX_FAILURE_SAMPLES);
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.count += other.count;
        for (kind, n) in other.by_kind {
            *self.by_kind.entry(kind).or_default() += n;
        }
        self.samples.extend(other.samples);
        self.samples.sort();
        self.samples.truncate(MAX_FAILURE_SAMPLES);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct PipelineOutcome<V> {
    pub result: V,
    /// Blocks decoded and visited.
    pub processed: u64,
    pub failures: FailureSummary,
    pub scan: ScanSummary,
    /// Shared counters as they stood once every worker had finished.
    pub progress: ProgressSnapshot,
}

struct RawBlock {
    pos: Position,
    data: Vec<u8>,
}

type SharedQueue = Arc<Mutex<mpsc::Receiver<RawBlock>>>;

struct WorkerOutput<V> {
    visitor: V,
    processed: u64,
    failures: FailureSummary,
}

fn work<V: BlockVisitor>(id: usize, queue: SharedQueue, progress: Arc<Progress>) -> WorkerOutput<V> {
    let mut out = WorkerOutput {
        visitor: V::default(),
        processed: 0,
        failures: FailureSummary::default(),
    };

    loop {
        // Only the dequeue happens under the lock; decoding runs unlocked.
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blocking_recv();
        let Some(raw) = next else { break };

        match mapblock::decode(&raw.data) {
            Ok(block) => {
                out.visitor.visit(raw.pos, &block);
                out.processed += 1;
                progress.record_processed();
            }
            Err(e) => {
                tracing::warn!("Failed to decode block {}: {}", raw.pos, e);
                out.failures.record(raw.pos, &e);
                progress.record_failed();
            }
        }
    }

    tracing::debug!(
        "Worker {} done: {} blocks, {} failed",
        id,
        out.processed,
        out.failures.count
    );
    out
}

/// Run `V` over every block `storage` holds inside `config.region`.
pub async fn run<S, V>(storage: &S, config: &PipelineConfig) -> Result<PipelineOutcome<V>, PipelineError>
where
    S: BlockStorage,
    V: BlockVisitor,
{
    let workers = config.workers.max(1);
    let capacity = config.queue_capacity.max(1);
    tracing::info!(
        "Scanning {} with {} workers (queue capacity {})",
        config.region,
        workers,
        capacity
    );

    let progress = Arc::new(Progress::new());
    let (tx, rx) = mpsc::channel::<RawBlock>(capacity);

    // Workers hold the only handles on the receiver, so if they all die
    // the sender sees a closed queue instead of blocking forever.
    let queue: SharedQueue = Arc::new(Mutex::new(rx));
    let handles: Vec<_> = (0..workers)
        .map(|id| {
            let queue = Arc::clone(&queue);
            let progress = Arc::clone(&progress);
            tokio::task::spawn_blocking(move || work::<V>(id, queue, progress))
        })
        .collect();
    drop(queue);

    // `tx` lives in the callback, which the scan drops on return, so the
    // queue closes whether the scan succeeded or not.
    let scan = storage
        .scan_region(config.region, move |pos, data| {
            let tx = tx.clone();
            async move {
                tx.send(RawBlock { pos, data })
                    .await
                    .map_err(|_| anyhow::anyhow!("worker pool shut down"))
            }
        })
        .await;

    let mut result = V::default();
    let mut processed = 0;
    let mut failures = FailureSummary::default();
    let mut worker_error = None;
    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok(out) => {
                result = result.merge(out.visitor);
                processed += out.processed;
                failures = failures.merge(out.failures);
            }
            Err(e) => {
                tracing::error!("Worker task failed: {}", e);
                worker_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    let scan = match scan {
        Ok(scan) => scan,
        Err(e) => {
            tracing::error!("Scan of {} aborted: {}", config.region, e);
            return Err(PipelineError::Storage(e));
        }
    };
    if let Some(e) = worker_error {
        return Err(PipelineError::Worker(e));
    }

    let snapshot = progress.snapshot();
    tracing::info!(
        "Scan finished: {} blocks processed, {} failed, {} skipped in {:.1}s",
        processed,
        failures.count,
        scan.skipped,
        snapshot.elapsed_secs
    );
    if !failures.is_empty() {
        tracing::warn!("{} blocks failed to decode: {:?}", failures.count, failures.by_kind);
    }

    Ok(PipelineOutcome {
        result,
        processed,
        failures,
        scan,
        progress: snapshot,
    })
}
