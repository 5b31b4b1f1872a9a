//! Pluggable bounds-check predicates.
//!
//! Whether a returned HBT descriptor "matches" a pointer, and whether a
//! probed slot is usable for a new descriptor, are policy decisions left
//! open by the hardware (which wires both to true). The LSU takes the
//! predicates as an injected trait object so the fail paths can be
//! exercised without touching the engine.

use crate::core::queues::{BdqEntry, McqEntry};

/// Verdicts for bounds probes and occupancy probes.
///
/// `bnd_check` inspects a probe response against a memory-check entry;
/// `occ_check` inspects one against a descriptor-store entry. Both receive
/// the raw descriptor word returned by the cache and the probing entry
/// (pointer value, current way, retry count).
pub trait BoundsPolicy {
    /// True if the returned descriptor covers the entry's pointer.
    fn bnd_check(&self, resp_data: u64, entry: &McqEntry) -> bool;

    /// True if the probed slot can hold the entry's descriptor.
    fn occ_check(&self, resp_data: u64, entry: &BdqEntry) -> bool;
}

/// The permissive default: every probe passes on the first way.
pub struct AlwaysPass;

impl BoundsPolicy for AlwaysPass {
    fn bnd_check(&self, _resp_data: u64, _entry: &McqEntry) -> bool {
        true
    }

    fn occ_check(&self, _resp_data: u64, _entry: &BdqEntry) -> bool {
        true
    }
}

/// Rejects every probe; drives entries into their fail states.
pub struct AlwaysFail;

impl BoundsPolicy for AlwaysFail {
    fn bnd_check(&self, _resp_data: u64, _entry: &McqEntry) -> bool {
        false
    }

    fn occ_check(&self, _resp_data: u64, _entry: &BdqEntry) -> bool {
        false
    }
}

/// Passes only once an entry has burned `ways` probes; exercises the
/// way-retry sequence without reaching the fail state.
pub struct PassAfter {
    /// Probes that must fail before one passes.
    pub ways: u32,
}

impl BoundsPolicy for PassAfter {
    fn bnd_check(&self, _resp_data: u64, entry: &McqEntry) -> bool {
        entry.count >= self.ways
    }

    fn occ_check(&self, _resp_data: u64, entry: &BdqEntry) -> bool {
        entry.count >= self.ways
    }
}

/// Treats the descriptor word itself as the verdict: a non-zero response
/// matches a bounds check, a zero response is a free slot. Lets a test (or
/// the CLI scenarios) model table contents in backing memory.
pub struct DescriptorWord;

impl BoundsPolicy for DescriptorWord {
    fn bnd_check(&self, resp_data: u64, _entry: &McqEntry) -> bool {
        resp_data != 0
    }

    fn occ_check(&self, resp_data: u64, _entry: &BdqEntry) -> bool {
        resp_data == 0
    }
}
