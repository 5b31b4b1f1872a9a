//! Behavioral models of the LSU's memory-side collaborators.
//!
//! These implement the `DCachePort` and `DTlb` traits well enough to drive
//! the unit end to end: fixed-latency cache responses over a backing store,
//! scripted nacks/refusals/releases, and page-granular translation with
//! scripted misses and faults.

/// Behavioral data cache.
pub mod dcache;

/// Behavioral DTLB.
pub mod dtlb;

pub use dcache::DCacheModel;
pub use dtlb::{DTlbModel, PageFault};
