//! Transfer coordinator
//!
//! Public entry point of a bulk transfer. One call picks a NUMA node for the
//! workers, sizes the pool, partitions the units, runs the workers on pinned
//! threads and folds their reports into a single outcome.

use crate::config::{DirectionBias, TransferConfig};
use crate::core::dispatch::Dispatcher;
use crate::core::planner::{fit_worker_count, worker_count, ChunkPlanner, PartitionMode};
use crate::core::worker::{RecoverableCopy, SliceCopy, WorkItem, WorkerPlan, WorkerReport, WorkerUnit};
use crate::error::{Result, TransferError};
use crate::system::{NumaTopology, TopologyProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary of a successful transfer call
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    /// Node hosting the workers
    pub node: usize,
    /// Partition regime used
    pub mode: PartitionMode,
    /// Number of workers
    pub workers: usize,
    /// CPU of each worker
    pub cpus: Vec<usize>,
    /// Units requested by the caller
    pub items_total: usize,
    /// Units handed to at least one worker
    pub items_dispatched: usize,
    /// Total bytes copied
    pub bytes_copied: u64,
    /// Wall time of the call
    pub duration: Duration,
    /// Bytes per second
    pub throughput: f64,
    /// Per-worker results, by worker index
    pub worker_reports: Vec<WorkerReport>,
}

impl TransferReport {
    /// Units that were never dispatched, if any
    pub fn shortfall(&self) -> Option<usize> {
        let missing = self.items_total.saturating_sub(self.items_dispatched);
        (missing > 0).then_some(missing)
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Transfer Summary ===");
        println!("Node:            {}", self.node);
        println!("Split:           {}", self.mode.name());
        println!("Workers:         {} on CPUs {:?}", self.workers, self.cpus);
        println!("Units:           {}/{}", self.items_dispatched, self.items_total);
        println!("Bytes copied:    {}", humansize::format_size(self.bytes_copied, humansize::BINARY));
        println!("Duration:        {:.2?}", self.duration);
        println!("Throughput:      {}/s", humansize::format_size(self.throughput as u64, humansize::BINARY));

        let unpinned = self.worker_reports.iter().filter(|r| !r.pinned).count();
        if unpinned > 0 {
            println!("Unpinned:        {} worker(s)", unpinned);
        }
    }
}

/// Node chosen to host the workers and its usable CPUs
#[derive(Debug, Clone)]
struct NodeSelection {
    node: usize,
    cpus: Vec<usize>,
}

/// Orchestrates one bulk transfer per call
pub struct TransferCoordinator {
    config: TransferConfig,
    topology: Arc<dyn TopologyProvider>,
    primitive: Arc<dyn RecoverableCopy>,
}

impl TransferCoordinator {
    /// Create a coordinator on the detected system topology
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            topology: Arc::new(NumaTopology::detect()),
            primitive: Arc::new(SliceCopy),
        }
    }

    /// Use a different topology provider
    pub fn with_topology(mut self, topology: Arc<dyn TopologyProvider>) -> Self {
        self.topology = topology;
        self
    }

    /// Use a different recoverable copy primitive
    pub fn with_copy_primitive(mut self, primitive: Arc<dyn RecoverableCopy>) -> Self {
        self.primitive = primitive;
        self
    }

    /// Tunables used by every call
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Copy every source unit into the destination unit at the same index
    ///
    /// `node_hint` stands in for the caller's node when neither buffer
    /// reports a home node; without it the node of the calling CPU is used.
    pub fn transfer(
        &self,
        src_units: &[&[u8]],
        dst_units: &mut [&mut [u8]],
        node_hint: Option<usize>,
    ) -> Result<TransferReport> {
        let start = Instant::now();
        self.config.validate()?;
        let nr_items = validate_units(src_units, dst_units)?;

        let selection = self.select_node(src_units[0].as_ptr(), dst_units[0].as_ptr(), node_hint)?;
        let mut lengths = Vec::new();
        lengths.try_reserve_exact(nr_items)?;
        lengths.extend(src_units.iter().map(|u| u.len()));

        let cpu_count = self.topology.cpu_count(selection.node).min(selection.cpus.len());
        let limit = worker_count(self.config.max_workers, cpu_count, self.config.hard_cap);
        let workers = fit_worker_count(limit, &lengths);
        if workers < limit {
            tracing::debug!(
                "Lowered workers from {} to {} so every unit splits evenly",
                limit,
                workers
            );
        }
        let cpus = selection.cpus[..workers].to_vec();

        let plan = ChunkPlanner::new(workers).plan(&lengths)?;
        let mut plans = allocate_plans(plan.item_counts(), &cpus)?;

        let mut items_dispatched = 0;
        let mut chunks = plan.chunks().iter().peekable();
        for (item, (src, dst)) in src_units.iter().zip(dst_units.iter_mut()).enumerate() {
            let mut src_rest: &[u8] = src;
            let mut dst_rest: &mut [u8] = dst;
            let mut dispatched = false;

            while let Some(chunk) = chunks.next_if(|c| c.item == item) {
                let (src_part, src_tail) = src_rest.split_at(chunk.len);
                let (dst_part, dst_tail) = std::mem::take(&mut dst_rest).split_at_mut(chunk.len);
                plans[chunk.worker].push(WorkItem::new(item, chunk.offset, src_part, dst_part));
                src_rest = src_tail;
                dst_rest = dst_tail;
                dispatched = true;
            }

            if dispatched {
                items_dispatched += 1;
            }
        }

        if items_dispatched != nr_items {
            tracing::warn!(
                "Only {} out of {} units were dispatched",
                items_dispatched,
                nr_items
            );
        }

        tracing::debug!(
            "Transferring {} units on node {} with {} workers ({} split, CPUs {:?})",
            nr_items,
            selection.node,
            workers,
            plan.mode().name(),
            cpus
        );

        let primitive: &dyn RecoverableCopy = &*self.primitive;
        let units = plans
            .into_iter()
            .map(|p| WorkerUnit::new(p, self.config.strategy, primitive))
            .collect();
        let reports = Dispatcher::from_config(&self.config).run_all(units)?;

        let failed: Vec<&WorkerReport> = reports.iter().filter(|r| r.failed()).collect();
        if !failed.is_empty() {
            let failed_items: usize = failed.iter().map(|r| r.items_failed).sum();
            let bytes_failed: u64 = failed.iter().map(|r| r.bytes_failed).sum();
            tracing::warn!(
                "{} of {} workers reported copy failures ({} items)",
                failed.len(),
                workers,
                failed_items
            );
            return Err(TransferError::PartialFailure {
                failed_workers: failed.len(),
                failed_items,
                bytes_failed,
            });
        }

        let bytes_copied: u64 = reports.iter().map(|r| r.bytes_copied).sum();
        let duration = start.elapsed();
        let throughput = bytes_copied as f64 / duration.as_secs_f64().max(f64::EPSILON);

        tracing::debug!(
            "Copied {} in {:.2?}",
            humansize::format_size(bytes_copied, humansize::BINARY),
            duration
        );

        Ok(TransferReport {
            node: selection.node,
            mode: plan.mode(),
            workers,
            cpus,
            items_total: nr_items,
            items_dispatched,
            bytes_copied,
            duration,
            throughput,
            worker_reports: reports,
        })
    }

    /// Pick the first candidate node with at least one usable CPU
    fn select_node(
        &self,
        src: *const u8,
        dst: *const u8,
        node_hint: Option<usize>,
    ) -> Result<NodeSelection> {
        let src_node = self.topology.node_of_address(src);
        let dst_node = self.topology.node_of_address(dst);
        let caller_node = node_hint.or_else(|| self.topology.current_node());

        let ordered = match self.config.bias {
            DirectionBias::Destination => [dst_node, src_node, caller_node],
            DirectionBias::Source => [src_node, dst_node, caller_node],
        };

        let mut candidates = Vec::with_capacity(ordered.len());
        for node in ordered.into_iter().flatten() {
            if candidates.contains(&node) {
                continue;
            }
            candidates.push(node);

            let cpus = self.topology.usable_cpus(node);
            if !cpus.is_empty() {
                return Ok(NodeSelection { node, cpus });
            }
            tracing::debug!("Node {} has no usable CPUs", node);
        }

        Err(TransferError::NoUsableTopology { candidates })
    }
}

impl Default for TransferCoordinator {
    fn default() -> Self {
        Self::new(TransferConfig::default())
    }
}

/// Check list cardinality and pairwise lengths, returning the unit count
fn validate_units(src_units: &[&[u8]], dst_units: &[&mut [u8]]) -> Result<usize> {
    if src_units.is_empty() {
        return Err(TransferError::invalid("nothing to transfer"));
    }
    if src_units.len() != dst_units.len() {
        return Err(TransferError::invalid(format!(
            "{} source units but {} destination units",
            src_units.len(),
            dst_units.len()
        )));
    }
    if let Some((index, (src, dst))) = src_units
        .iter()
        .zip(dst_units.iter())
        .enumerate()
        .find(|(_, (src, dst))| src.len() != dst.len())
    {
        return Err(TransferError::invalid(format!(
            "unit {} has {} source bytes but {} destination bytes",
            index,
            src.len(),
            dst.len()
        )));
    }
    Ok(src_units.len())
}

/// Allocate one empty plan per worker, sized for its item count
fn allocate_plans<'a>(item_counts: &[usize], cpus: &[usize]) -> Result<Vec<WorkerPlan<'a>>> {
    let mut plans = Vec::new();
    plans.try_reserve_exact(item_counts.len())?;
    for (worker, (&count, &cpu)) in item_counts.iter().zip(cpus).enumerate() {
        plans.push(WorkerPlan::with_capacity(worker, cpu, count)?);
    }
    Ok(plans)
}

/// Transfer with default tunables on the detected topology
pub fn transfer(
    src_units: &[&[u8]],
    dst_units: &mut [&mut [u8]],
    node_hint: Option<usize>,
) -> Result<TransferReport> {
    TransferCoordinator::default().transfer(src_units, dst_units, node_hint)
}
