//! Transfer workers
//!
//! A worker runs the copy instructions of its plan strictly in order on one
//! thread. With the best-effort strategy a failed instruction is recorded and
//! the worker moves on, so the rest of the plan is still copied and the
//! failure is reported once at the end.

use crate::config::CopyStrategy;
use crate::error::Result;
use serde::Serialize;
use std::time::{Duration, Instant};

/// A copy primitive that can survive partial read failures
///
/// Implementations copy `src` into `dst` (equal lengths) and return the
/// number of trailing bytes they could not copy. Zero means success.
pub trait RecoverableCopy: Send + Sync {
    /// Copy as much as possible, returning the bytes left uncopied
    fn copy_recoverable(&self, dst: &mut [u8], src: &[u8]) -> usize;
}

/// Plain slice copy; never reports a failure
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceCopy;

impl RecoverableCopy for SliceCopy {
    fn copy_recoverable(&self, dst: &mut [u8], src: &[u8]) -> usize {
        dst.copy_from_slice(src);
        0
    }
}

/// One copy instruction: `src` into `dst`, both `len()` bytes long
#[derive(Debug)]
pub struct WorkItem<'a> {
    item: usize,
    offset: usize,
    src: &'a [u8],
    dst: &'a mut [u8],
}

impl<'a> WorkItem<'a> {
    /// Create an instruction for bytes at `offset` of unit `item`
    pub fn new(item: usize, offset: usize, src: &'a [u8], dst: &'a mut [u8]) -> Self {
        debug_assert_eq!(src.len(), dst.len());
        Self { item, offset, src, dst }
    }

    /// Unit index
    pub fn item(&self) -> usize {
        self.item
    }

    /// Byte offset inside the unit
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte count
    pub fn len(&self) -> usize {
        self.src.len()
    }

    /// Check if the instruction copies nothing
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }
}

/// Ordered instructions of one worker and the CPU it runs on
#[derive(Debug)]
pub struct WorkerPlan<'a> {
    worker: usize,
    cpu: usize,
    items: Vec<WorkItem<'a>>,
}

impl<'a> WorkerPlan<'a> {
    /// Create an empty plan with room for `capacity` instructions
    pub fn with_capacity(worker: usize, cpu: usize, capacity: usize) -> Result<Self> {
        let mut items = Vec::new();
        items.try_reserve_exact(capacity)?;
        Ok(Self { worker, cpu, items })
    }

    /// Append an instruction
    pub fn push(&mut self, item: WorkItem<'a>) {
        self.items.push(item);
    }

    /// Worker index
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Target CPU
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    /// Instructions in execution order
    pub fn items(&self) -> &[WorkItem<'a>] {
        &self.items
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the plan has no instructions
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total bytes the plan copies
    pub fn bytes(&self) -> u64 {
        self.items.iter().map(|i| i.len() as u64).sum()
    }
}

/// Outcome of one worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    /// Worker index
    pub worker: usize,
    /// CPU the worker was assigned
    pub cpu: usize,
    /// Whether the thread was actually pinned
    pub pinned: bool,
    /// Instructions in the plan
    pub items_total: usize,
    /// Instructions that did not fully copy
    pub items_failed: usize,
    /// Bytes copied
    pub bytes_copied: u64,
    /// Bytes left uncopied
    pub bytes_failed: u64,
    /// The copy loop panicked
    pub panicked: bool,
    /// Time spent in the copy loop
    pub elapsed: Duration,
}

impl WorkerReport {
    /// Report for a worker whose copy loop panicked
    pub fn panicked(worker: usize, cpu: usize, items_total: usize, bytes_total: u64) -> Self {
        Self {
            worker,
            cpu,
            pinned: false,
            items_total,
            items_failed: items_total,
            bytes_copied: 0,
            bytes_failed: bytes_total,
            panicked: true,
            elapsed: Duration::ZERO,
        }
    }

    /// Check if any instruction failed
    pub fn failed(&self) -> bool {
        self.items_failed > 0 || self.panicked
    }
}

/// A worker ready to run its plan
pub struct WorkerUnit<'a> {
    plan: WorkerPlan<'a>,
    strategy: CopyStrategy,
    primitive: &'a dyn RecoverableCopy,
}

impl<'a> WorkerUnit<'a> {
    /// Create a worker for `plan`
    pub fn new(
        plan: WorkerPlan<'a>,
        strategy: CopyStrategy,
        primitive: &'a dyn RecoverableCopy,
    ) -> Self {
        Self {
            plan,
            strategy,
            primitive,
        }
    }

    /// The plan this worker runs
    pub fn plan(&self) -> &WorkerPlan<'a> {
        &self.plan
    }

    /// Run every instruction in order on the current thread
    pub fn run(self, pinned: bool) -> WorkerReport {
        let start = Instant::now();
        let WorkerPlan { worker, cpu, items } = self.plan;
        let items_total = items.len();

        let mut items_failed = 0;
        let mut bytes_copied = 0u64;
        let mut bytes_failed = 0u64;

        for WorkItem { item, offset, src, dst } in items {
            let len = src.len();

            let missed = match self.strategy {
                CopyStrategy::AssumeReliable => {
                    dst.copy_from_slice(src);
                    0
                }
                CopyStrategy::BestEffortRecoverable => {
                    self.primitive.copy_recoverable(dst, src).min(len)
                }
            };

            if missed > 0 {
                items_failed += 1;
                bytes_failed += missed as u64;
                tracing::debug!(
                    "Worker {} failed {} of {} bytes at unit {} offset {}",
                    worker,
                    missed,
                    len,
                    item,
                    offset
                );
            }
            bytes_copied += (len - missed) as u64;
        }

        WorkerReport {
            worker,
            cpu,
            pinned,
            items_total,
            items_failed,
            bytes_copied,
            bytes_failed,
            panicked: false,
            elapsed: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Refuses to copy any source that starts with the poison byte
    struct PoisonedCopy(u8);

    impl RecoverableCopy for PoisonedCopy {
        fn copy_recoverable(&self, dst: &mut [u8], src: &[u8]) -> usize {
            if src.first() == Some(&self.0) {
                src.len()
            } else {
                dst.copy_from_slice(src);
                0
            }
        }
    }

    fn build_plan<'a>(srcs: &'a [Vec<u8>], dsts: &'a mut [Vec<u8>]) -> WorkerPlan<'a> {
        let mut plan = WorkerPlan::with_capacity(0, 0, srcs.len()).unwrap();
        for (item, (src, dst)) in srcs.iter().zip(dsts.iter_mut()).enumerate() {
            plan.push(WorkItem::new(item, 0, src, dst));
        }
        plan
    }

    #[test]
    fn test_worker_copies_in_order() {
        let srcs = vec![vec![1u8; 512], vec![2u8; 256], vec![3u8; 128]];
        let mut dsts = vec![vec![0u8; 512], vec![0u8; 256], vec![0u8; 128]];

        let plan = build_plan(&srcs, &mut dsts);
        assert_eq!(plan.bytes(), 896);

        let report = WorkerUnit::new(plan, CopyStrategy::BestEffortRecoverable, &SliceCopy).run(false);

        assert!(!report.failed());
        assert_eq!(report.items_total, 3);
        assert_eq!(report.bytes_copied, 896);
        assert_eq!(srcs, dsts);
    }

    #[test]
    fn test_best_effort_finishes_after_failure() {
        let srcs = vec![vec![1u8; 64], vec![0xEE; 64], vec![3u8; 64]];
        let mut dsts = vec![vec![0u8; 64]; 3];

        let plan = build_plan(&srcs, &mut dsts);
        let poison = PoisonedCopy(0xEE);
        let report = WorkerUnit::new(plan, CopyStrategy::BestEffortRecoverable, &poison).run(false);

        assert!(report.failed());
        assert_eq!(report.items_failed, 1);
        assert_eq!(report.bytes_failed, 64);
        assert_eq!(report.bytes_copied, 128);
        assert_eq!(dsts[0], srcs[0]);
        assert_eq!(dsts[1], vec![0u8; 64]);
        assert_eq!(dsts[2], srcs[2]);
    }

    #[test]
    fn test_reliable_strategy_bypasses_primitive() {
        let srcs = vec![vec![0xEE; 32]];
        let mut dsts = vec![vec![0u8; 32]];

        let plan = build_plan(&srcs, &mut dsts);
        let poison = PoisonedCopy(0xEE);
        let report = WorkerUnit::new(plan, CopyStrategy::AssumeReliable, &poison).run(true);

        assert!(!report.failed());
        assert!(report.pinned);
        assert_eq!(dsts, srcs);
    }

    #[test]
    fn test_plan_capacity_overflow_is_exhaustion() {
        let err = WorkerPlan::with_capacity(0, 0, usize::MAX).unwrap_err();
        assert!(matches!(err, crate::error::TransferError::ResourceExhausted(_)));
    }

    #[test]
    fn test_panicked_report() {
        let report = WorkerReport::panicked(2, 5, 3, 3072);
        assert!(report.failed());
        assert_eq!(report.items_failed, 3);
        assert_eq!(report.bytes_failed, 3072);
    }
}
