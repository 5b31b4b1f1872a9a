//! The load/store unit core: queues, arbitration, search, and writeback.
//!
//! This module groups everything evaluated inside the unit's clock domain:
//! 1. **Micro-ops:** the descriptor a dispatched memory op carries.
//! 2. **Interfaces:** the per-cycle input/output bundles and collaborator traits.
//! 3. **Queues:** the LDQ, STQ, MCQ, and BDQ circular buffers.
//! 4. **LSU:** the cycle-stepped engine tying them together.
//! 5. **Bounds policy:** the injected probe predicates.

/// Pluggable bounds-check predicates.
pub mod bounds;

/// Per-cycle interface bundles and collaborator traits.
pub mod interface;

/// The cycle-stepped load/store unit.
pub mod lsu;

/// The four operation queues.
pub mod queues;

/// Micro-op descriptors and branch tags.
pub mod uop;

pub use lsu::Lsu;
