//! Memory exception definitions and age-ordered selection.
//!
//! This module defines the error kinds the LSU can raise toward the core. It provides:
//! 1. **Exception Representation:** All faults a memory operation can produce, with the
//!    faulting address attached.
//! 2. **Reporting Records:** The `(rob_idx, branch mask, cause)` bundle latched toward the ROB.
//! 3. **Oldest-First Selection:** Concurrent faults are resolved by ROB-relative age; only
//!    the oldest offender is reported in a given cycle.

use std::fmt;

/// Exception kinds a memory operation can raise.
///
/// TLB misses and cache nacks are not exceptions; they are retried locally
/// and never appear here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemException {
    /// Load address not naturally aligned. Carries the misaligned address.
    LoadAddrMisaligned(u64),

    /// Store address not naturally aligned. Carries the misaligned address.
    StoreAddrMisaligned(u64),

    /// Load translation walked to an invalid mapping. Carries the virtual address.
    LoadPageFault(u64),

    /// Store translation walked to an invalid mapping. Carries the virtual address.
    StorePageFault(u64),

    /// Load touched a physically inaccessible region. Carries the address.
    LoadAccessFault(u64),

    /// Store touched a physically inaccessible region. Carries the address.
    StoreAccessFault(u64),

    /// A speculative load read stale data relative to an older store or an
    /// observed older load. Carries the load's address; the core replays
    /// from the offending instruction.
    MemOrdering(u64),

    /// The bounds-check engine exhausted all probe ways without a matching
    /// descriptor. Carries the tagged pointer value.
    BoundsFail(u64),

    /// The descriptor engine found no free slot for a bounds store.
    /// Carries the tagged pointer value.
    OccupancyFail(u64),
}

impl MemException {
    /// Returns the faulting address attached to the exception.
    pub fn badaddr(&self) -> u64 {
        match *self {
            MemException::LoadAddrMisaligned(a)
            | MemException::StoreAddrMisaligned(a)
            | MemException::LoadPageFault(a)
            | MemException::StorePageFault(a)
            | MemException::LoadAccessFault(a)
            | MemException::StoreAccessFault(a)
            | MemException::MemOrdering(a)
            | MemException::BoundsFail(a)
            | MemException::OccupancyFail(a) => a,
        }
    }
}

impl fmt::Display for MemException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemException::LoadAddrMisaligned(a) => write!(f, "LoadAddrMisaligned({:#x})", a),
            MemException::StoreAddrMisaligned(a) => write!(f, "StoreAddrMisaligned({:#x})", a),
            MemException::LoadPageFault(a) => write!(f, "LoadPageFault({:#x})", a),
            MemException::StorePageFault(a) => write!(f, "StorePageFault({:#x})", a),
            MemException::LoadAccessFault(a) => write!(f, "LoadAccessFault({:#x})", a),
            MemException::StoreAccessFault(a) => write!(f, "StoreAccessFault({:#x})", a),
            MemException::MemOrdering(a) => write!(f, "MemOrdering({:#x})", a),
            MemException::BoundsFail(a) => write!(f, "BoundsFail({:#x})", a),
            MemException::OccupancyFail(a) => write!(f, "OccupancyFail({:#x})", a),
        }
    }
}

impl std::error::Error for MemException {}

/// An exception latched toward the ROB.
///
/// Valid for one cycle on the core interface. The branch mask travels with
/// the record so a report whose micro-op dies to a misprediction in the
/// latching cycle can be suppressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// ROB index of the offending micro-op.
    pub rob_idx: usize,
    /// Branch mask of the offending micro-op at report time.
    pub br_mask: u16,
    /// The fault itself.
    pub cause: MemException,
}

/// ROB-relative age of an index, measured forward from the current head.
#[inline]
pub fn rob_age(rob_idx: usize, rob_head: usize, rob_entries: usize) -> usize {
    (rob_idx + rob_entries - rob_head) % rob_entries
}

/// Picks the oldest of several concurrent faults.
///
/// Age is measured modulo the ROB head so wrapped indices compare correctly.
/// Ties keep the earliest candidate, which matches the fixed scan order of
/// the reporting lanes.
pub fn oldest_exception(
    candidates: &[ExceptionInfo],
    rob_head: usize,
    rob_entries: usize,
) -> Option<ExceptionInfo> {
    candidates
        .iter()
        .min_by_key(|x| rob_age(x.rob_idx, rob_head, rob_entries))
        .copied()
}
