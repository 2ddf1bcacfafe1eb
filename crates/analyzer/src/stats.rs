//! Node-count statistics: how many nodes of each content type a world holds.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use lopater_engine::mapblock::MapBlock;
use lopater_engine::world::node::ContentId;
use lopater_engine::world::position::Position;

use crate::pipeline::progress::ProgressSnapshot;
use crate::pipeline::{BlockVisitor, FailureSummary, PipelineOutcome};

/// Content name to node count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeCounts {
    counts: HashMap<String, u64>,
}

impl NodeCounts {
    /// Count the nodes of `block` by content name, in grid order.
    ///
    /// Stops at the first content id missing from the block's mapping and
    /// returns it; nodes before it stay counted.
    pub fn fold_block(&mut self, block: &MapBlock) -> Option<ContentId> {
        for id in block.content_ids() {
            let Some(name) = block.content_name(id) else {
                return Some(id);
            };
            match self.counts.get_mut(name) {
                Some(count) => *count += 1,
                None => {
                    self.counts.insert(name.to_owned(), 1);
                }
            }
        }
        None
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Entries ranked by count descending, then name ascending.
    pub fn ranked(&self) -> Vec<NodeCount> {
        let mut ranked: Vec<NodeCount> = self
            .counts
            .iter()
            .map(|(name, &count)| NodeCount {
                name: name.clone(),
                count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        ranked
    }
}

impl BlockVisitor for NodeCounts {
    fn visit(&mut self, pos: Position, block: &MapBlock) {
        if let Some(id) = self.fold_block(block) {
            tracing::debug!("Block {} has unmapped content id {}, rest of block ignored", pos, id.0);
        }
    }

    fn merge(mut self, mut other: Self) -> Self {
        if self.counts.len() < other.counts.len() {
            std::mem::swap(&mut self, &mut other);
        }
        for (name, count) in other.counts {
            *self.counts.entry(name).or_default() += count;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeCount {
    pub name: String,
    pub count: u64,
}

/// Final report of a node-count run.
#[derive(Debug, Clone, Serialize)]
pub struct NodeCountReport {
    pub blocks_processed: u64,
    /// Blocks the scan callback rejected.
    pub blocks_skipped: u64,
    pub total_nodes: u64,
    pub counts: Vec<NodeCount>,
    pub failures: FailureSummary,
    pub progress: ProgressSnapshot,
}

impl NodeCountReport {
    pub fn new(outcome: PipelineOutcome<NodeCounts>) -> Self {
        Self {
            blocks_processed: outcome.processed,
            blocks_skipped: outcome.scan.skipped,
            total_nodes: outcome.result.total(),
            counts: outcome.result.ranked(),
            failures: outcome.failures,
            progress: outcome.progress,
        }
    }

    /// Keep only the `n` most frequent entries.
    pub fn truncate(&mut self, n: usize) {
        self.counts.truncate(n);
    }
}

impl fmt::Display for NodeCountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} blocks processed, {} failed, {} skipped in {:.1}s",
            self.blocks_processed, self.failures.count, self.blocks_skipped, self.progress.elapsed_secs
        )?;
        writeln!(f, "{} nodes counted", self.total_nodes)?;
        for entry in &self.counts {
            writeln!(f, "{:>14}  {}", entry.count, entry.name)?;
        }

        if !self.failures.is_empty() {
            writeln!(f, "Decode failures:")?;
            for (kind, n) in &self.failures.by_kind {
                writeln!(f, "{:>14}  {}", n, kind)?;
            }
            for sample in &self.failures.samples {
                writeln!(f, "  {}: {}", sample.position, sample.reason)?;
            }
        }
        Ok(())
    }
}
