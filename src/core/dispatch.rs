//! Dispatch and join of transfer workers
//!
//! Every worker gets its own scoped thread, pinned to the CPU of its plan.
//! Scoped threads let workers borrow the caller's buffers directly; the scope
//! guarantees all of them have finished before the borrows end. Reports come
//! back over a channel so the waiting thread can notice stalls.

use crate::config::TransferConfig;
use crate::core::worker::{WorkerReport, WorkerUnit};
use crate::error::{Result, TransferError};
use crate::system::ThreadAffinity;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Runs worker units on pinned threads and waits for all of them
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    pin_workers: bool,
    stall_warning: Option<Duration>,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(pin_workers: bool, stall_warning: Option<Duration>) -> Self {
        Self {
            pin_workers,
            stall_warning,
        }
    }

    /// Create a dispatcher from the transfer tunables
    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.pin_workers, config.stall_warning)
    }

    /// Run every unit and block until all have finished
    ///
    /// Reports are returned sorted by worker index. If a thread cannot be
    /// spawned, no further units are started, the undispatched plans are
    /// dropped, the running ones are joined, and `ResourceExhausted` is
    /// returned.
    pub fn run_all(&self, units: Vec<WorkerUnit<'_>>) -> Result<Vec<WorkerReport>> {
        let (tx, rx) = unbounded();
        let pin = self.pin_workers;

        let (reports, spawned, spawn_error) = crossbeam::thread::scope(|scope| {
            let mut spawned = 0;
            let mut spawn_error = None;

            for unit in units {
                let tx = tx.clone();
                let name = format!("mtcopy-w{}-cpu{}", unit.plan().worker(), unit.plan().cpu());

                let result = scope.builder().name(name).spawn(move |_| {
                    let _ = tx.send(run_unit(unit, pin));
                });

                match result {
                    Ok(_) => spawned += 1,
                    Err(e) => {
                        spawn_error = Some(e);
                        break;
                    }
                }
            }
            drop(tx);

            (self.join_all(&rx, spawned), spawned, spawn_error)
        })
        .map_err(|_| TransferError::ThreadPool("worker thread panicked".to_string()))?;

        if let Some(e) = spawn_error {
            tracing::warn!("Spawned only {} workers before failing: {}", spawned, e);
            return Err(TransferError::exhausted(format!(
                "failed to spawn worker thread: {}",
                e
            )));
        }

        if reports.len() < spawned {
            return Err(TransferError::ThreadPool(format!(
                "{} of {} workers exited without a report",
                spawned - reports.len(),
                spawned
            )));
        }

        Ok(reports)
    }

    /// Collect `expected` reports, warning whenever progress stalls
    fn join_all(&self, rx: &Receiver<WorkerReport>, expected: usize) -> Vec<WorkerReport> {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(expected);

        while reports.len() < expected {
            let received = match self.stall_warning {
                Some(interval) => match rx.recv_timeout(interval) {
                    Ok(report) => Some(report),
                    Err(RecvTimeoutError::Timeout) => {
                        tracing::warn!(
                            "Transfer stalled: {} of {} workers done after {}",
                            reports.len(),
                            expected,
                            humantime::format_duration(started.elapsed())
                        );
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => None,
                },
                None => rx.recv().ok(),
            };

            match received {
                Some(report) => reports.push(report),
                None => break,
            }
        }

        reports.sort_by_key(|r| r.worker);
        reports
    }
}

/// Body of one worker thread
fn run_unit(unit: WorkerUnit<'_>, pin: bool) -> WorkerReport {
    let worker = unit.plan().worker();
    let cpu = unit.plan().cpu();
    let items_total = unit.plan().len();
    let bytes_total = unit.plan().bytes();

    let pinned = pin
        && match ThreadAffinity::pin_to_cpu(cpu) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Worker {} could not pin to CPU {}: {}", worker, cpu, e);
                false
            }
        };

    match panic::catch_unwind(AssertUnwindSafe(|| unit.run(pinned))) {
        Ok(report) => report,
        Err(_) => {
            tracing::warn!("Worker {} panicked on CPU {}", worker, cpu);
            WorkerReport::panicked(worker, cpu, items_total, bytes_total)
        }
    }
}
