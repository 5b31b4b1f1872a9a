//! Scripted test bench for the LSU.
//!
//! Owns the unit and the behavioral collaborator models and plays the role
//! of the core: it dispatches micro-ops, delivers addresses and data on the
//! AGU lanes one cycle later, feeds the commit stream, opens and resolves
//! branches, and raises exceptions. Integration tests and the CLI scenarios
//! drive everything through this type.

use std::collections::{BTreeMap, VecDeque};

use crate::config::LsuConfig;
use crate::core::Lsu;
use crate::core::bounds::BoundsPolicy;
use crate::core::interface::{AguRequest, HellaRequest, LsuInputs, LsuOutputs};
use crate::core::uop::{BranchInfo, DstType, MemCmd, MemWidth, MicroOp, UopCode};
use crate::soc::{DCacheModel, DTlbModel};
use crate::stats::CounterInit;

/// Handle to a dispatched micro-op, carrying its allocated queue indices.
#[derive(Clone, Copy, Debug)]
pub struct OpHandle {
    /// The micro-op as echoed by dispatch.
    pub uop: MicroOp,
}

impl OpHandle {
    /// LDQ slot, if the op holds one.
    pub fn ldq_idx(&self) -> Option<usize> {
        self.uop.uses_ldq.then_some(self.uop.ldq_idx)
    }

    /// STQ slot, if the op holds one.
    pub fn stq_idx(&self) -> Option<usize> {
        self.uop.uses_stq.then_some(self.uop.stq_idx)
    }

    /// MCQ slot, if the op holds one.
    pub fn mcq_idx(&self) -> Option<usize> {
        self.uop.uses_mcq.then_some(self.uop.mcq_idx)
    }

    /// BDQ slot, if the op holds one.
    pub fn bdq_idx(&self) -> Option<usize> {
        self.uop.uses_bdq.then_some(self.uop.bdq_idx)
    }
}

/// An open (unresolved) branch: the speculation tag plus the queue tails
/// snapshotted when it was "renamed".
#[derive(Clone, Copy, Debug)]
pub struct OpenBranch {
    info: BranchInfo,
}

/// The scripted test bench.
pub struct TestBench {
    /// The unit under test.
    pub lsu: Lsu,
    /// Behavioral data cache.
    pub dcache: DCacheModel,
    /// Behavioral DTLB.
    pub dtlb: DTlbModel,
    /// Cycles stepped so far.
    pub cycle: u64,
    /// Outputs of the most recent step.
    pub last: LsuOutputs,

    core_width: usize,
    mem_width: usize,
    rob_entries: usize,
    next_rob: usize,
    next_dst: usize,
    open_br_mask: u16,

    staged_dispatch: Vec<Option<MicroOp>>,
    staged_brinfo: Option<BranchInfo>,
    staged_exception: bool,
    staged_init: Option<CounterInit>,
    staged_fence_dmem: bool,
    load_at_rob_head: bool,
    hella_pending: Option<HellaRequest>,
    commit_queue: VecDeque<MicroOp>,
    agu_queue: BTreeMap<u64, Vec<AguRequest>>,
}

impl TestBench {
    /// Builds a bench with the default (always-pass) bounds policy.
    pub fn new(config: &LsuConfig) -> Self {
        Self::build(config, None)
    }

    /// Builds a bench with an injected bounds policy.
    pub fn with_policy(config: &LsuConfig, policy: Box<dyn BoundsPolicy>) -> Self {
        Self::build(config, Some(policy))
    }

    fn build(config: &LsuConfig, policy: Option<Box<dyn BoundsPolicy>>) -> Self {
        config.validate().expect("invalid configuration");
        let lsu = match policy {
            Some(p) => Lsu::with_policy(config, p),
            None => Lsu::new(config),
        };
        let core_width = config.pipeline.core_width;
        let mem_width = config.pipeline.mem_width;
        Self {
            lsu,
            dcache: DCacheModel::new(&config.dcache),
            dtlb: DTlbModel::new(&config.dtlb),
            cycle: 0,
            last: LsuOutputs::new(core_width, mem_width),
            core_width,
            mem_width,
            rob_entries: config.pipeline.rob_entries,
            next_rob: 0,
            next_dst: 5,
            open_br_mask: 0,
            staged_dispatch: vec![None; core_width],
            staged_brinfo: None,
            staged_exception: false,
            staged_init: None,
            staged_fence_dmem: false,
            load_at_rob_head: false,
            hella_pending: None,
            commit_queue: VecDeque::new(),
            agu_queue: BTreeMap::new(),
        }
    }

    /// Advances the whole bench by one cycle.
    pub fn step(&mut self) -> &LsuOutputs {
        let dmem_out = self.dcache.tick();

        let mut inp = LsuInputs::new(self.core_width, self.mem_width);
        inp.dmem = dmem_out;
        inp.dispatch = std::mem::replace(&mut self.staged_dispatch, vec![None; self.core_width]);
        inp.brinfo = self.staged_brinfo.take();
        inp.exception = std::mem::take(&mut self.staged_exception);
        inp.init_wyfy = self.staged_init.take();
        inp.fence_dmem = std::mem::take(&mut self.staged_fence_dmem);
        inp.commit_load_at_rob_head = self.load_at_rob_head;
        inp.hella_req = self.hella_pending;

        if let Some(reqs) = self.agu_queue.remove(&self.cycle) {
            let mut lane = 0;
            for req in reqs {
                if lane < self.mem_width {
                    inp.agu[lane] = Some(req);
                    lane += 1;
                } else {
                    // More deliveries than lanes: slip to the next cycle.
                    self.agu_queue.entry(self.cycle + 1).or_default().push(req);
                }
            }
        }

        for lane in 0..self.core_width {
            if let Some(uop) = self.commit_queue.pop_front() {
                inp.commit[lane] = Some(uop);
            }
        }

        self.last = self.lsu.tick(&inp, &mut self.dtlb, &mut self.dcache);
        if !self.last.hella_ready {
            self.hella_pending = None;
        }
        self.cycle += 1;
        &self.last
    }

    /// Steps `n` cycles.
    pub fn step_n(&mut self, n: u64) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Steps until `pred` holds on the outputs, up to `max` cycles.
    /// Returns true if the predicate was met.
    pub fn run_until(&mut self, max: u64, mut pred: impl FnMut(&LsuOutputs) -> bool) -> bool {
        for _ in 0..max {
            self.step();
            if pred(&self.last) {
                return true;
            }
        }
        false
    }

    fn alloc_rob(&mut self) -> usize {
        let idx = self.next_rob;
        self.next_rob = (self.next_rob + 1) % self.rob_entries;
        idx
    }

    fn alloc_dst(&mut self) -> usize {
        let reg = self.next_dst;
        self.next_dst = if self.next_dst >= 31 { 5 } else { self.next_dst + 1 };
        reg
    }

    /// Dispatches a raw micro-op this step and returns the echoed handle.
    pub fn dispatch(&mut self, uop: MicroOp) -> OpHandle {
        let lane = match self.staged_dispatch.iter().position(|s| s.is_none()) {
            Some(lane) => lane,
            None => {
                self.step();
                0
            }
        };
        self.staged_dispatch[lane] = Some(uop);
        self.step();
        let dispatched = self.last.dispatched[lane].expect("dispatch was refused");
        OpHandle { uop: dispatched }
    }

    /// Schedules an AGU delivery for the upcoming cycle.
    pub fn send_agu(&mut self, uop: MicroOp, addr: Option<u64>, data: Option<u64>) {
        self.agu_queue.entry(self.cycle).or_default().push(AguRequest {
            uop,
            addr,
            data,
            mxcpt: None,
            is_sfence: false,
        });
    }

    /// Dispatches a load; its address arrives on the next cycle.
    pub fn load(&mut self, addr: u64, width: MemWidth) -> OpHandle {
        let uop = MicroOp {
            code: UopCode::Load,
            rob_idx: self.alloc_rob(),
            br_mask: self.open_br_mask,
            uses_ldq: true,
            mem_cmd: MemCmd::Read,
            width,
            dst_reg: self.alloc_dst(),
            dst_type: DstType::Int,
            ..Default::default()
        };
        let h = self.dispatch(uop);
        self.send_agu(h.uop, Some(addr), None);
        h
    }

    /// Dispatches a PAC-tagged load (drives the bounds engine's signed path).
    pub fn load_tagged(&mut self, tagged_addr: u64, width: MemWidth, signed: bool) -> OpHandle {
        let uop = MicroOp {
            code: UopCode::Load,
            rob_idx: self.alloc_rob(),
            br_mask: self.open_br_mask,
            uses_ldq: true,
            mem_cmd: MemCmd::Read,
            width,
            dst_reg: self.alloc_dst(),
            dst_type: DstType::Int,
            pac_signed: signed,
            ..Default::default()
        };
        let h = self.dispatch(uop);
        self.send_agu(h.uop, Some(tagged_addr), None);
        h
    }

    /// Dispatches a store; address and data arrive fused on the next cycle.
    pub fn store(&mut self, addr: u64, data: u64, width: MemWidth) -> OpHandle {
        let uop = self.store_uop(width);
        let h = self.dispatch(uop);
        self.send_agu(h.uop, Some(addr), Some(data));
        h
    }

    /// Dispatches a store whose address and data arrive separately; deliver
    /// them later with `send_agu`.
    pub fn store_split(&mut self, width: MemWidth) -> OpHandle {
        let uop = self.store_uop(width);
        self.dispatch(uop)
    }

    fn store_uop(&mut self, width: MemWidth) -> MicroOp {
        MicroOp {
            code: UopCode::Store,
            rob_idx: self.alloc_rob(),
            br_mask: self.open_br_mask,
            uses_stq: true,
            mem_cmd: MemCmd::Write,
            width,
            ..Default::default()
        }
    }

    /// Dispatches a memory fence into the store queue.
    pub fn fence(&mut self) -> OpHandle {
        let uop = MicroOp {
            code: UopCode::Fence,
            rob_idx: self.alloc_rob(),
            br_mask: self.open_br_mask,
            uses_stq: true,
            mem_cmd: MemCmd::Write,
            ..Default::default()
        };
        self.dispatch(uop)
    }

    /// Dispatches a bounds-descriptor op; pointer and descriptor arrive on
    /// the next cycle.
    pub fn bounds_op(&mut self, code: UopCode, tagged_addr: u64, descriptor: u64) -> OpHandle {
        debug_assert!(matches!(
            code,
            UopCode::BndStr | UopCode::BndClr | UopCode::BndSrch
        ));
        let uop = MicroOp {
            code,
            rob_idx: self.alloc_rob(),
            br_mask: self.open_br_mask,
            uses_bdq: true,
            mem_cmd: MemCmd::Read,
            width: MemWidth::Double,
            ..Default::default()
        };
        let h = self.dispatch(uop);
        self.send_agu(h.uop, Some(tagged_addr), Some(descriptor));
        h
    }

    /// Queues a commit for the op; applied on upcoming cycles in order.
    pub fn commit(&mut self, h: &OpHandle) {
        self.commit_queue.push_back(h.uop);
    }

    /// Opens a branch: ops dispatched from now on depend on it.
    pub fn open_branch(&mut self) -> OpenBranch {
        let bit = (0..16)
            .map(|b| 1u16 << b)
            .find(|b| self.open_br_mask & b == 0)
            .expect("too many open branches");
        self.open_br_mask |= bit;
        OpenBranch {
            info: BranchInfo {
                mask: bit,
                mispredict: false,
                ldq_tail: self.lsu.ldq.tail(),
                stq_tail: self.lsu.stq.tail(),
                mcq_tail: self.lsu.mcq.tail(),
                bdq_tail: self.lsu.bdq.tail(),
            },
        }
    }

    /// Resolves an open branch on the upcoming cycle.
    pub fn resolve_branch(&mut self, branch: OpenBranch, mispredict: bool) {
        let mut info = branch.info;
        info.mispredict = mispredict;
        self.staged_brinfo = Some(info);
        self.open_br_mask &= !info.mask;
    }

    /// Raises the core exception signal on the upcoming cycle.
    pub fn raise_exception(&mut self) {
        self.staged_exception = true;
    }

    /// Asserts the fence-drain request on the upcoming cycle.
    pub fn request_fence_drain(&mut self) {
        self.staged_fence_dmem = true;
    }

    /// Sets the "load at ROB head" hint used by uncacheable loads.
    pub fn set_load_at_rob_head(&mut self, v: bool) {
        self.load_at_rob_head = v;
    }

    /// Loads the counter CSRs on the upcoming cycle.
    pub fn init_counters(&mut self, init: CounterInit) {
        self.staged_init = Some(init);
    }

    /// Posts a hella-channel request; held until the shim accepts it.
    pub fn hella_request(&mut self, req: HellaRequest) {
        self.hella_pending = Some(req);
    }

    /// Returns integer-channel writeback data seen in the last step, if any.
    pub fn iresp_data(&self) -> Option<u64> {
        self.last.iresp.iter().flatten().map(|r| r.data).next()
    }

    /// Returns integer-channel writeback data for a specific load.
    pub fn iresp_for(&self, h: &OpHandle) -> Option<u64> {
        self.last
            .iresp
            .iter()
            .flatten()
            .find(|r| r.uop.rob_idx == h.uop.rob_idx)
            .map(|r| r.data)
    }
}
