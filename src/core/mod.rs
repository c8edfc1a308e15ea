//! Core transfer engine module
//!
//! Provides the work partitioning, the per-CPU workers, their dispatch and
//! join, and the coordinator tying them into one transfer call.

mod coordinator;
mod dispatch;
mod planner;
mod worker;

pub use coordinator::*;
pub use dispatch::*;
pub use planner::*;
pub use worker::*;
