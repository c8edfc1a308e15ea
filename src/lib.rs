//! # mtcopy - NUMA-aware multi-threaded memory transfer
//!
//! mtcopy moves bytes from a list of source regions into a list of
//! destination regions of the same shape, using a small pool of worker
//! threads pinned to CPUs of the NUMA node that owns the data.
//!
//! ## Features
//!
//! - **Topology-aware placement**: workers run on the destination node, then
//!   the source node, then the caller's node, whichever first has usable CPUs
//! - **Two split regimes**: few large regions are cut into one slice per
//!   worker; many regions are dealt out whole
//! - **Best-effort completion**: a failed copy does not stop its worker, the
//!   failure is reported once the whole plan has run
//! - **Safe partitioning**: work items are carved from the caller's slices,
//!   so no two workers ever touch the same bytes
//!
//! ## Quick Start
//!
//! ```no_run
//! let src = vec![7u8; 1 << 20];
//! let mut dst = vec![0u8; 1 << 20];
//!
//! let report = mtcopy::transfer(&[&src[..]], &mut [&mut dst[..]], None).unwrap();
//! println!("Copied {} bytes with {} workers", report.bytes_copied, report.workers);
//! ```
//!
//! ## Custom Tunables
//!
//! ```no_run
//! use mtcopy::config::{DirectionBias, TransferConfig};
//! use mtcopy::core::TransferCoordinator;
//!
//! let config = TransferConfig {
//!     max_workers: 8,
//!     bias: DirectionBias::Source,
//!     ..Default::default()
//! };
//! let coordinator = TransferCoordinator::new(config);
//!
//! let pages: Vec<Vec<u8>> = (0..64).map(|_| vec![1u8; 4096]).collect();
//! let mut copies: Vec<Vec<u8>> = (0..64).map(|_| vec![0u8; 4096]).collect();
//!
//! let src: Vec<&[u8]> = pages.iter().map(|p| p.as_slice()).collect();
//! let mut dst: Vec<&mut [u8]> = copies.iter_mut().map(|p| p.as_mut_slice()).collect();
//!
//! let report = coordinator.transfer(&src, &mut dst, None).unwrap();
//! report.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod system;

// Re-export commonly used types
pub use crate::config::{CopyStrategy, DirectionBias, TransferConfig};
pub use crate::core::{transfer, PartitionMode, TransferCoordinator, TransferReport};
pub use crate::error::{Result, TransferError, TransferOutcome};
pub use crate::system::{NumaTopology, TopologyProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use mtcopy::prelude::*;
    //! ```

    pub use crate::config::{CopyStrategy, DirectionBias, TransferConfig};
    pub use crate::core::{
        transfer, ChunkPlanner, PartitionMode, RecoverableCopy, TransferCoordinator, TransferReport,
    };
    pub use crate::error::{Result, TransferError, TransferOutcome};
    pub use crate::system::{NumaTopology, ThreadAffinity, TopologyProvider};
}
