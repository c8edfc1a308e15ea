//! Work partitioning across transfer workers
//!
//! Decides how many workers a call uses and which byte ranges each of them
//! copies. Planning is pure: it only sees unit lengths and produces chunk
//! descriptors, so every plan can be checked without touching memory.
//!
//! Two regimes:
//! - **Fine split** (`nr_items < workers`): every worker copies a slice of
//!   every unit, so a few very large units still use all workers.
//! - **Coarse split** (`nr_items >= workers`): whole units are dealt out in
//!   contiguous runs, the first `nr_items % workers` workers taking one extra.

use crate::error::{Result, TransferError};
use serde::Serialize;

/// How units are spread over workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionMode {
    /// Each unit is cut into one equal chunk per worker
    Fine,
    /// Each unit goes whole to a single worker
    Coarse,
}

impl PartitionMode {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fine => "fine",
            Self::Coarse => "coarse",
        }
    }
}

/// One planned copy range: bytes `[offset, offset + len)` of unit `item`,
/// copied by `worker`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Worker index
    pub worker: usize,
    /// Unit index in the transfer lists
    pub item: usize,
    /// Byte offset inside the unit
    pub offset: usize,
    /// Byte count
    pub len: usize,
}

/// Complete partition of one call's units over its workers
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    mode: PartitionMode,
    workers: usize,
    /// Sorted by `(item, offset)`
    chunks: Vec<Chunk>,
    item_counts: Vec<usize>,
}

impl PartitionPlan {
    /// Partition regime of this plan
    pub fn mode(&self) -> PartitionMode {
        self.mode
    }

    /// Number of workers the plan is built for
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// All chunks, ordered by unit then offset
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of work items each worker receives
    pub fn item_counts(&self) -> &[usize] {
        &self.item_counts
    }

    /// Chunks of one worker in execution order
    pub fn worker_chunks(&self, worker: usize) -> impl Iterator<Item = &Chunk> + '_ {
        self.chunks.iter().filter(move |c| c.worker == worker)
    }

    /// Number of distinct units covered by the plan
    pub fn items_covered(&self) -> usize {
        let mut covered = 0;
        let mut last = None;
        for chunk in &self.chunks {
            if last != Some(chunk.item) {
                covered += 1;
                last = Some(chunk.item);
            }
        }
        covered
    }
}

/// Compute the worker count of a call
///
/// The unit count deliberately does not clamp the result: with fewer units
/// than workers the fine split keeps every worker busy.
pub fn worker_count(limit: usize, usable_cpus: usize, hard_cap: usize) -> usize {
    limit.min(usable_cpus).min(hard_cap).max(1)
}

/// Largest worker count up to `limit` that the units can be planned for
///
/// A coarse split accepts any unit length. A fine split needs every unit to
/// divide evenly, so below the unit count the count is lowered until it
/// divides every length. One worker always fits.
pub fn fit_worker_count(limit: usize, lengths: &[usize]) -> usize {
    let nr_items = lengths.len();
    (1..=limit.max(1))
        .rev()
        .find(|&workers| nr_items >= workers || lengths.iter().all(|len| len % workers == 0))
        .unwrap_or(1)
}

/// Splits transfer units across a fixed number of workers
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    workers: usize,
}

impl ChunkPlanner {
    /// Create a planner for `total_workers` workers (at least one)
    pub fn new(total_workers: usize) -> Self {
        Self {
            workers: total_workers.max(1),
        }
    }

    /// Number of workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Partition regime for `nr_items` units
    pub fn mode(&self, nr_items: usize) -> PartitionMode {
        if nr_items < self.workers {
            PartitionMode::Fine
        } else {
            PartitionMode::Coarse
        }
    }

    /// Work items per worker for `nr_items` units
    pub fn item_counts(&self, nr_items: usize) -> Vec<usize> {
        match self.mode(nr_items) {
            PartitionMode::Fine => vec![nr_items; self.workers],
            PartitionMode::Coarse => {
                let base = nr_items / self.workers;
                let extra = nr_items % self.workers;
                (0..self.workers)
                    .map(|worker| base + usize::from(worker < extra))
                    .collect()
            }
        }
    }

    /// Build the plan for units of the given lengths
    pub fn plan(&self, lengths: &[usize]) -> Result<PartitionPlan> {
        let nr_items = lengths.len();
        if nr_items == 0 {
            return Err(TransferError::invalid("nothing to transfer"));
        }

        let mode = self.mode(nr_items);
        let item_counts = self.item_counts(nr_items);

        let mut chunks = Vec::new();
        chunks.try_reserve_exact(item_counts.iter().sum())?;

        match mode {
            PartitionMode::Fine => {
                for (item, &len) in lengths.iter().enumerate() {
                    if len % self.workers != 0 {
                        return Err(TransferError::invalid(format!(
                            "unit {} of {} bytes cannot be split evenly across {} workers",
                            item, len, self.workers
                        )));
                    }

                    let chunk_len = len / self.workers;
                    chunks.extend((0..self.workers).map(|worker| Chunk {
                        worker,
                        item,
                        offset: worker * chunk_len,
                        len: chunk_len,
                    }));
                }
            }
            PartitionMode::Coarse => {
                let mut worker = 0;
                let mut assigned = 0;
                for (item, &len) in lengths.iter().enumerate() {
                    while assigned == item_counts[worker] {
                        worker += 1;
                        assigned = 0;
                    }
                    chunks.push(Chunk {
                        worker,
                        item,
                        offset: 0,
                        len,
                    });
                    assigned += 1;
                }
            }
        }

        tracing::debug!(
            "Planned {} units over {} workers ({} split, {} chunks)",
            nr_items,
            self.workers,
            mode.name(),
            chunks.len()
        );

        Ok(PartitionPlan {
            mode,
            workers: self.workers,
            chunks,
            item_counts,
        })
    }
}
