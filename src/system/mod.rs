//! System topology module
//!
//! Provides NUMA topology detection and thread placement used to keep
//! transfer workers local to the memory they move.

pub mod numa;

pub use numa::{NumaNode, NumaTopology, ThreadAffinity, TopologyProvider};
