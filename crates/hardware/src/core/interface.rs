//! Interface bundles between the LSU and its collaborators.
//!
//! The LSU is evaluated once per cycle against by-value input/output bundles
//! plus two handshaking trait objects. This module defines:
//! 1. **Core Side:** dispatch, AGU, commit, branch, and exception inputs;
//!    full flags, writeback responses, and status outputs.
//! 2. **Memory Side:** the `DTlb` and `DCachePort` traits the collaborator
//!    models (and test mocks) implement, plus the response bundles sampled
//!    at the start of each cycle.
//! 3. **Hella Side:** the scalar bypass channel request/response pair.

use crate::common::error::{ExceptionInfo, MemException};
use crate::core::uop::{BranchInfo, MemCmd, MemWidth, MicroOp};
use crate::stats::CounterInit;

/// A translation request driven down one TLB lane.
#[derive(Clone, Copy, Debug)]
pub struct TlbRequest {
    /// Virtual address, PAC already stripped.
    pub vaddr: u64,
    /// Access width.
    pub size: MemWidth,
    /// Read or write intent (selects the fault kind).
    pub cmd: MemCmd,
}

/// Same-cycle response from one TLB lane.
#[derive(Clone, Copy, Debug, Default)]
pub struct TlbResponse {
    /// Translated physical address; meaningless on miss or fault.
    pub paddr: u64,
    /// Translation missed; the op parks and retries.
    pub miss: bool,
    /// Page fault on load access.
    pub pf_ld: bool,
    /// Page fault on store access.
    pub pf_st: bool,
    /// Access fault on load access.
    pub ae_ld: bool,
    /// Access fault on store access.
    pub ae_st: bool,
    /// The target region is cacheable.
    pub cacheable: bool,
}

impl TlbResponse {
    /// Folds the fault bits into an exception for the given access, if any.
    pub fn fault(&self, is_store: bool, vaddr: u64) -> Option<MemException> {
        if is_store {
            if self.pf_st {
                return Some(MemException::StorePageFault(vaddr));
            }
            if self.ae_st {
                return Some(MemException::StoreAccessFault(vaddr));
            }
        } else {
            if self.pf_ld {
                return Some(MemException::LoadPageFault(vaddr));
            }
            if self.ae_ld {
                return Some(MemException::LoadAccessFault(vaddr));
            }
        }
        None
    }
}

/// The DTLB as seen by the LSU: one combinational translation per lane per
/// cycle, plus the shootdown strobe.
pub trait DTlb {
    /// Translates on the given lane; responds in the same cycle.
    fn translate(&mut self, lane: usize, req: &TlbRequest) -> TlbResponse;

    /// Flushes translations (SFENCE).
    fn sfence(&mut self);
}

/// One memory request driven down a cache lane.
#[derive(Clone, Debug)]
pub struct DmemRequest {
    /// Physical address.
    pub addr: u64,
    /// Store data (ignored for reads).
    pub data: u64,
    /// The requesting micro-op; echoed back on the response.
    pub uop: MicroOp,
}

/// The data cache as seen by the LSU: per-lane request acceptance with
/// same-cycle backpressure, and a late kill for the just-issued request.
pub trait DCachePort {
    /// Offers a request on the given lane. Returns true if accepted.
    fn try_request(&mut self, lane: usize, req: DmemRequest) -> bool;

    /// Cancels the request accepted on this lane in the current cycle.
    fn kill(&mut self, lane: usize);
}

/// A data/ack response from the cache.
#[derive(Clone, Debug)]
pub struct DmemResponse {
    /// Lane the original request was issued on.
    pub lane: usize,
    /// The requesting micro-op.
    pub uop: MicroOp,
    /// Load data (or SC success code); zero for plain store acks.
    pub data: u64,
}

/// A refusal that must be retried.
#[derive(Clone, Debug)]
pub struct DmemNack {
    /// The refused micro-op.
    pub uop: MicroOp,
}

/// Everything the cache produced for this cycle, sampled at tick start.
#[derive(Clone, Debug, Default)]
pub struct DmemOutputs {
    /// Data and ack responses.
    pub responses: Vec<DmemResponse>,
    /// Refused requests.
    pub nacks: Vec<DmemNack>,
    /// A cache block became externally visible (block-aligned address).
    pub release: Option<u64>,
    /// All earlier stores are globally ordered (fence completion).
    pub ordered: bool,
}

/// Address/data delivery from the address-generation path for one lane.
#[derive(Clone, Debug)]
pub struct AguRequest {
    /// The executing micro-op.
    pub uop: MicroOp,
    /// Computed effective address (loads, store-address, bounds ops).
    pub addr: Option<u64>,
    /// Store data (store-data and fused store ops, bounds descriptors).
    pub data: Option<u64>,
    /// Misalignment fault detected during address generation.
    pub mxcpt: Option<MemException>,
    /// This is a TLB shootdown.
    pub is_sfence: bool,
}

/// A scalar request on the hella bypass channel.
#[derive(Clone, Copy, Debug)]
pub struct HellaRequest {
    /// Virtual address.
    pub addr: u64,
    /// Store data.
    pub data: u64,
    /// Read or write.
    pub cmd: MemCmd,
    /// Access width.
    pub size: MemWidth,
    /// Sign-extend the response.
    pub signed: bool,
    /// Client tag echoed on the response.
    pub tag: u64,
}

/// Completion of a hella request.
#[derive(Clone, Copy, Debug)]
pub struct HellaResponse {
    /// Loaded data, extended per `signed`/`size`.
    pub data: u64,
    /// Original virtual address.
    pub addr: u64,
    /// Client tag.
    pub tag: u64,
    /// Original command.
    pub cmd: MemCmd,
    /// Sign extension applied.
    pub signed: bool,
    /// Access width.
    pub size: MemWidth,
}

/// All core-side and memory-side inputs for one cycle.
#[derive(Clone, Debug, Default)]
pub struct LsuInputs {
    /// Dispatched micro-ops, one per core lane, left to right.
    pub dispatch: Vec<Option<MicroOp>>,
    /// Address-generation deliveries, one per memory lane.
    pub agu: Vec<Option<AguRequest>>,
    /// Commit stream, one per core lane.
    pub commit: Vec<Option<MicroOp>>,
    /// The load at the ROB head is committing; unblocks uncacheable loads.
    pub commit_load_at_rob_head: bool,
    /// Branch resolution broadcast.
    pub brinfo: Option<BranchInfo>,
    /// The core is taking an exception; squash speculative state.
    pub exception: bool,
    /// Current ROB head index.
    pub rob_head_idx: usize,
    /// Point-of-no-return ROB index.
    pub rob_pnr_idx: usize,
    /// The core requests full memory ordering (fence drain).
    pub fence_dmem: bool,
    /// Cache outputs produced this cycle.
    pub dmem: DmemOutputs,
    /// Scalar bypass request, held until accepted.
    pub hella_req: Option<HellaRequest>,
    /// Rising-edge counter initialization payload.
    pub init_wyfy: Option<CounterInit>,
}

impl LsuInputs {
    /// Creates an empty input bundle for the given widths.
    pub fn new(core_width: usize, mem_width: usize) -> Self {
        Self {
            dispatch: vec![None; core_width],
            agu: std::iter::repeat_with(|| None).take(mem_width).collect(),
            commit: vec![None; core_width],
            ..Default::default()
        }
    }
}

/// A writeback presented to the core on an execution response channel.
#[derive(Clone, Debug)]
pub struct ExecResponse {
    /// The completing micro-op.
    pub uop: MicroOp,
    /// Result data, extended per the op's width and sign.
    pub data: u64,
}

/// All outputs for one cycle.
#[derive(Clone, Debug, Default)]
pub struct LsuOutputs {
    /// LDQ cannot accept a load on this dispatch lane.
    pub ldq_full: Vec<bool>,
    /// STQ cannot accept a store on this dispatch lane.
    pub stq_full: Vec<bool>,
    /// MCQ cannot accept a memory op on this dispatch lane.
    pub mcq_full: Vec<bool>,
    /// BDQ cannot accept a descriptor op on this dispatch lane.
    pub bdq_full: Vec<bool>,
    /// Dispatched micro-ops echoed with their allocated queue indices.
    pub dispatched: Vec<Option<MicroOp>>,

    /// Integer writeback channel, one per memory lane.
    pub iresp: Vec<Option<ExecResponse>>,
    /// Floating-point writeback channel, one per memory lane.
    pub fresp: Vec<Option<ExecResponse>>,

    /// ROB busy-clear strobes; `mem_width` store lanes plus one FP
    /// store-data lane. Carries the cleared op's ROB index.
    pub clr_bsy: Vec<Option<usize>>,
    /// Speculation-safe strobes for cleanly translated loads.
    pub clr_unsafe: Vec<Option<usize>>,

    /// A lane-0 integer load expects data next cycle.
    pub spec_ld_wakeup: Option<usize>,
    /// Last cycle's speculative wakeup did not deliver.
    pub ld_miss: bool,
    /// The store queue has drained; an instruction fence may proceed.
    pub fencei_rdy: bool,
    /// A committed fence is waiting at the store-queue head; the cache is
    /// asked to globally order outstanding accesses.
    pub force_order: bool,
    /// Exception report, valid for one cycle.
    pub lxcpt: Option<ExceptionInfo>,

    /// The hella channel can accept a request.
    pub hella_ready: bool,
    /// The hella request was refused in its second stage.
    pub hella_s2_nack: bool,
    /// The hella request faulted in its second stage.
    pub hella_s2_xcpt: Option<MemException>,
    /// Hella completion.
    pub hella_resp: Option<HellaResponse>,
}

impl LsuOutputs {
    /// Creates an empty output bundle for the given widths.
    pub fn new(core_width: usize, mem_width: usize) -> Self {
        Self {
            ldq_full: vec![false; core_width],
            stq_full: vec![false; core_width],
            mcq_full: vec![false; core_width],
            bdq_full: vec![false; core_width],
            dispatched: vec![None; core_width],
            iresp: std::iter::repeat_with(|| None).take(mem_width).collect(),
            fresp: std::iter::repeat_with(|| None).take(mem_width).collect(),
            clr_bsy: vec![None; mem_width + 1],
            clr_unsafe: vec![None; mem_width],
            ..Default::default()
        }
    }
}
