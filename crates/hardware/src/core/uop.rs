//! Micro-op descriptors and branch speculation tags.
//!
//! This module defines the signals a dispatched memory micro-op carries through
//! the LSU. It performs:
//! 1. **Operation Classification:** Memory command, access width, and destination kinds.
//! 2. **Queue Routing:** Which of the four queues a micro-op occupies and at what index.
//! 3. **Speculation Tracking:** The branch mask each in-flight op depends on, and the
//!    kill/resolve updates applied when a branch resolves.

/// Memory command kinds as seen by the cache port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemCmd {
    /// Plain read (loads, bounds probes).
    #[default]
    Read,

    /// Plain write (stores, bounds descriptor stores).
    Write,

    /// Load-reserved: a read that arms the reservation window.
    Lr,

    /// Store-conditional: a write predicated on the reservation.
    Sc,

    /// Atomic read-modify-write.
    Amo,
}

impl MemCmd {
    /// Returns true if the command reads memory.
    #[inline]
    pub fn is_read(self) -> bool {
        matches!(self, MemCmd::Read | MemCmd::Lr | MemCmd::Amo)
    }

    /// Returns true if the command writes memory.
    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, MemCmd::Write | MemCmd::Sc | MemCmd::Amo)
    }
}

/// Memory access width for load and store operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemWidth {
    /// 8-bit byte access.
    #[default]
    Byte,

    /// 16-bit half-word access.
    Half,

    /// 32-bit word access.
    Word,

    /// 64-bit double-word access.
    Double,
}

impl MemWidth {
    /// Access size in bytes.
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            MemWidth::Byte => 1,
            MemWidth::Half => 2,
            MemWidth::Word => 4,
            MemWidth::Double => 8,
        }
    }
}

/// Destination register file of a load's writeback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DstType {
    /// No destination (stores, fences, bounds ops).
    #[default]
    None,

    /// Integer register file.
    Int,

    /// Floating-point register file.
    Float,
}

/// Micro-op codes the LSU distinguishes.
///
/// Only the classification the LSU acts on is kept; everything else about
/// the instruction stays in the front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UopCode {
    /// Integer or FP load.
    #[default]
    Load,

    /// Integer or FP store.
    Store,

    /// Atomic memory operation (occupies the STQ).
    AmoOp,

    /// Memory fence.
    Fence,

    /// Instruction-stream fence.
    FenceI,

    /// TLB shootdown.
    Sfence,

    /// Bounds-descriptor store (allocation).
    BndStr,

    /// Bounds-descriptor clear (deallocation).
    BndClr,

    /// Bounds-descriptor search.
    BndSrch,
}

/// A dispatched memory micro-op.
///
/// The queue indices are assigned by the LSU at dispatch and handed back to
/// the core; the front-end echoes them on the AGU and commit interfaces.
#[derive(Clone, Copy, Debug, Default)]
pub struct MicroOp {
    /// Operation class.
    pub code: UopCode,
    /// ROB index assigned at rename.
    pub rob_idx: usize,
    /// In-flight branches this op depends on; one bit per unresolved branch.
    pub br_mask: u16,

    /// Load queue slot, valid iff `uses_ldq`.
    pub ldq_idx: usize,
    /// Store queue slot, valid iff `uses_stq`.
    pub stq_idx: usize,
    /// Memory-check queue slot, valid iff `uses_mcq`.
    pub mcq_idx: usize,
    /// Bounds-descriptor queue slot, valid iff `uses_bdq`.
    pub bdq_idx: usize,

    /// Occupies the load queue.
    pub uses_ldq: bool,
    /// Occupies the store queue.
    pub uses_stq: bool,
    /// Occupies the memory-check queue.
    pub uses_mcq: bool,
    /// Occupies the bounds-descriptor queue.
    pub uses_bdq: bool,

    /// Command presented to the cache.
    pub mem_cmd: MemCmd,
    /// Access width.
    pub width: MemWidth,
    /// Load result is sign-extended.
    pub signed_load: bool,

    /// Destination physical register.
    pub dst_reg: usize,
    /// Destination register file.
    pub dst_type: DstType,

    /// Pointer carries a PAC signature (drives the signed/unsigned counters).
    pub pac_signed: bool,
    /// Store data lives in the FP register file (routes the extra clr-bsy slot).
    pub fp_std: bool,
    /// Marked excepted at dispatch; dropped without allocation.
    pub exception: bool,
    /// Synthesized by the hella shim; occupies no queue.
    pub is_hella: bool,
}

impl MicroOp {
    /// Returns true for fence-class ops, which never allocate an MCQ slot
    /// and block the store-commit path until ordered.
    #[inline]
    pub fn is_fence(&self) -> bool {
        matches!(self.code, UopCode::Fence | UopCode::FenceI)
    }

    /// Returns true for atomic ops.
    #[inline]
    pub fn is_amo(&self) -> bool {
        self.code == UopCode::AmoOp
    }

    /// Returns true if the op touches data memory (loads, stores, atomics).
    #[inline]
    pub fn touches_memory(&self) -> bool {
        self.uses_ldq || self.uses_stq
    }

    /// Returns true if a resolving branch kills this op.
    #[inline]
    pub fn killed_by(&self, br: &BranchInfo) -> bool {
        br.mispredict && (self.br_mask & br.mask) != 0
    }

    /// Clears the resolved branch's bit from the mask.
    #[inline]
    pub fn clear_branch(&mut self, br: &BranchInfo) {
        self.br_mask &= !br.mask;
    }
}

/// A branch resolution broadcast from the core.
///
/// Carries the queue tails snapshotted when the branch was renamed; a
/// misprediction restores them, deallocating everything younger.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchInfo {
    /// Bit of the resolving branch.
    pub mask: u16,
    /// True if the branch resolved against its prediction.
    pub mispredict: bool,
    /// LDQ tail at rename of the branch.
    pub ldq_tail: usize,
    /// STQ tail at rename of the branch.
    pub stq_tail: usize,
    /// MCQ tail at rename of the branch.
    pub mcq_tail: usize,
    /// BDQ tail at rename of the branch.
    pub bdq_tail: usize,
}
