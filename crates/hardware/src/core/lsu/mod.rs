//! The out-of-order load/store unit.
//!
//! One `tick` evaluates a full cycle: sampled cache outputs are written
//! back, new micro-ops dispatch into the queues, the arbiter awards the
//! lane resources, winners translate and issue to the cache, the search
//! engine enforces ordering and locates forwarding, the commit stream
//! retires entries, and squashes are applied. Registered state (selection
//! indices, block masks, the latched exception) updates at the end of the
//! cycle, so decisions made this cycle take effect in the next one.

use crate::common::addr::{VirtAddr, hbt_slot_addr};
use crate::common::error::{ExceptionInfo, oldest_exception};
use crate::config::LsuConfig;
use crate::core::bounds::{AlwaysPass, BoundsPolicy};
use crate::core::interface::{
    DCachePort, DTlb, DmemRequest, LsuInputs, LsuOutputs, TlbRequest,
};
use crate::core::lsu::arbiter::{FireCategory, FiredOp};
use crate::core::lsu::forward::WbForward;
use crate::core::lsu::hella::HellaShim;
use crate::core::queues::{BdqState, BoundsDescQueue, LoadQueue, McqState, MemCheckQueue, StoreQueue};
use crate::core::uop::{DstType, MicroOp, UopCode};
use crate::stats::LsuStats;

pub mod arbiter;
pub mod dispatch;
pub mod forward;
pub mod hella;
pub mod lcam;
pub mod writeback;

mod commit;

/// A speculative load wakeup awaiting confirmation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SpecWakeup {
    /// LDQ slot whose response must appear on lane 0 next cycle.
    pub ldq_idx: usize,
}

/// The load/store unit model.
pub struct Lsu {
    // Width and layout parameters, copied out of the config.
    pub(crate) core_width: usize,
    pub(crate) mem_width: usize,
    pub(crate) rob_entries: usize,
    pub(crate) lrsc_cycles: u32,
    pub(crate) wyfy_enable: bool,
    pub(crate) hbt_base_addr: u64,
    pub(crate) hbt_num_way: u32,
    pub(crate) block_bytes: u64,
    pub(crate) trace: bool,

    /// In-flight loads.
    pub ldq: LoadQueue,
    /// In-flight stores.
    pub stq: StoreQueue,
    /// In-flight bounds checks.
    pub mcq: MemCheckQueue,
    /// In-flight descriptor ops.
    pub bdq: BoundsDescQueue,

    pub(crate) policy: Box<dyn BoundsPolicy>,

    // Registered state, updated at the cycle boundary.
    pub(crate) live_store_mask: u64,
    pub(crate) block_load_mask: u64,
    pub(crate) p1_block_load_mask: u64,
    pub(crate) p2_block_load_mask: u64,
    pub(crate) r_ldq_retry_idx: Option<usize>,
    pub(crate) r_ldq_wakeup_idx: Option<usize>,
    pub(crate) r_stq_retry_idx: Option<usize>,
    pub(crate) r_mcq_probe_idx: Option<usize>,
    pub(crate) r_bdq_probe_idx: Option<usize>,
    pub(crate) r_bdq_store_idx: Option<usize>,
    pub(crate) lrsc_count: u32,
    pub(crate) hella: HellaShim,
    pub(crate) pending_releases: std::collections::VecDeque<u64>,
    pub(crate) r_xcpt: Option<ExceptionInfo>,
    pub(crate) wb_forward: Vec<Option<WbForward>>,
    pub(crate) r_spec_wakeup: Option<SpecWakeup>,

    // Per-cycle scratch.
    pub(crate) xcpt_candidates: Vec<ExceptionInfo>,
    pub(crate) nacking_loads: u64,
    pub(crate) dmem_ordered: bool,

    /// Counter CSRs and telemetry.
    pub stats: LsuStats,
}

impl Lsu {
    /// Creates an LSU with the default bounds policy (every probe passes).
    pub fn new(config: &LsuConfig) -> Self {
        Self::with_policy(config, Box::new(AlwaysPass))
    }

    /// Creates an LSU with an injected bounds policy.
    pub fn with_policy(config: &LsuConfig, policy: Box<dyn BoundsPolicy>) -> Self {
        Self {
            core_width: config.pipeline.core_width,
            mem_width: config.pipeline.mem_width,
            rob_entries: config.pipeline.rob_entries,
            lrsc_cycles: config.pipeline.lrsc_cycles,
            wyfy_enable: config.wyfy.enable,
            hbt_base_addr: config.wyfy.hbt_base_addr,
            hbt_num_way: config.wyfy.hbt_num_way,
            block_bytes: config.dcache.block_bytes,
            trace: config.general.trace,
            ldq: LoadQueue::new(config.queues.ldq_entries),
            stq: StoreQueue::new(config.queues.stq_entries),
            mcq: MemCheckQueue::new(config.queues.mcq_entries),
            bdq: BoundsDescQueue::new(config.queues.bdq_entries),
            policy,
            live_store_mask: 0,
            block_load_mask: 0,
            p1_block_load_mask: 0,
            p2_block_load_mask: 0,
            r_ldq_retry_idx: None,
            r_ldq_wakeup_idx: None,
            r_stq_retry_idx: None,
            r_mcq_probe_idx: None,
            r_bdq_probe_idx: None,
            r_bdq_store_idx: None,
            lrsc_count: 0,
            hella: HellaShim::new(),
            pending_releases: std::collections::VecDeque::new(),
            r_xcpt: None,
            wb_forward: std::iter::repeat_with(|| None)
                .take(config.pipeline.mem_width)
                .collect(),
            r_spec_wakeup: None,
            xcpt_candidates: Vec::new(),
            nacking_loads: 0,
            dmem_ordered: false,
            stats: LsuStats::default(),
        }
    }

    /// Current live-store set: one bit per occupied STQ slot.
    pub fn live_store_mask(&self) -> u64 {
        self.live_store_mask
    }

    /// Cycles remaining in the LR reservation window.
    pub fn lrsc_count(&self) -> u32 {
        self.lrsc_count
    }

    /// Current hella-channel state, for inspection.
    pub fn hella_state(&self) -> hella::HellaState {
        self.hella.state()
    }

    /// Advances the model by one clock cycle.
    pub fn tick(
        &mut self,
        inp: &LsuInputs,
        tlb: &mut dyn DTlb,
        dmem: &mut dyn DCachePort,
    ) -> LsuOutputs {
        let mut out = LsuOutputs::new(self.core_width, self.mem_width);
        self.xcpt_candidates.clear();
        self.nacking_loads = 0;

        if let Some(init) = &inp.init_wyfy {
            self.stats.load_counters(init);
        }

        // Last cycle's latched exception reports now, unless its micro-op
        // just died.
        if let Some(x) = self.r_xcpt.take() {
            let killed = inp
                .brinfo
                .is_some_and(|br| br.mispredict && (x.br_mask & br.mask) != 0);
            if !killed && !inp.exception {
                out.lxcpt = Some(x);
            }
        }

        let hst = self.hella.step();
        out.hella_s2_nack = hst.s2_nack;
        out.hella_s2_xcpt = hst.s2_xcpt;

        self.run_writeback(inp, &mut out);
        self.run_dispatch(inp, &mut out);
        self.run_agu_delivery(inp);

        let mut fired = self.select_fires(inp);
        self.run_tlb_stage(inp, &mut fired, tlb, &mut out);
        self.run_dcache_issue(inp, &mut fired, dmem, &mut out);
        self.run_lcam(&fired, dmem);
        self.run_commit(inp, &mut out);
        self.run_kill(inp);
        self.update_registers(inp);

        out.hella_ready = self.hella.is_ready();
        out
    }

    /// Translation stage for this cycle's winners.
    fn run_tlb_stage(
        &mut self,
        inp: &LsuInputs,
        fired: &mut [FiredOp],
        tlb: &mut dyn DTlb,
        out: &mut LsuOutputs,
    ) {
        for op in fired.iter_mut() {
            match op.cat {
                FireCategory::LoadIncoming => {
                    let raw = op.agu_addr.expect("load incoming without address");
                    if let Some(x) = op.mxcpt {
                        self.mark_ldq_fault(op.uop.ldq_idx, raw, x);
                        continue;
                    }
                    let vaddr = VirtAddr::new(raw).strip_pac().val();
                    let resp = tlb.translate(
                        op.lane,
                        &TlbRequest {
                            vaddr,
                            size: op.uop.width,
                            cmd: op.uop.mem_cmd,
                        },
                    );
                    if let Some(x) = resp.fault(false, vaddr) {
                        self.mark_ldq_fault(op.uop.ldq_idx, vaddr, x);
                        continue;
                    }
                    if let Some(e) = self.ldq.get_mut(op.uop.ldq_idx) {
                        e.addr = Some(if resp.miss { vaddr } else { resp.paddr });
                        e.addr_is_virtual = resp.miss;
                        e.addr_is_uncacheable = !resp.miss && !resp.cacheable;
                    }
                    op.tlb_miss = resp.miss;
                    op.uncacheable = !resp.cacheable;
                    op.paddr = (!resp.miss).then_some(resp.paddr);
                    if !resp.miss {
                        out.clr_unsafe[op.lane] = Some(op.uop.rob_idx);
                    }
                }
                FireCategory::StadIncoming | FireCategory::StaIncoming => {
                    let raw = op.agu_addr.expect("store address without address");
                    if op.cat == FireCategory::StadIncoming {
                        if let Some(e) = self.stq.get_mut(op.uop.stq_idx) {
                            e.data = op.agu_data;
                        }
                    }
                    if let Some(x) = op.mxcpt {
                        self.mark_stq_fault(op.uop.stq_idx, raw, x);
                        continue;
                    }
                    let vaddr = VirtAddr::new(raw).strip_pac().val();
                    let resp = tlb.translate(
                        op.lane,
                        &TlbRequest {
                            vaddr,
                            size: op.uop.width,
                            cmd: op.uop.mem_cmd,
                        },
                    );
                    if let Some(x) = resp.fault(true, vaddr) {
                        self.mark_stq_fault(op.uop.stq_idx, vaddr, x);
                        continue;
                    }
                    let mut clr = false;
                    if let Some(e) = self.stq.get_mut(op.uop.stq_idx) {
                        e.addr = Some(if resp.miss { vaddr } else { resp.paddr });
                        e.addr_is_virtual = resp.miss;
                        clr = !resp.miss && e.data.is_some();
                    }
                    op.tlb_miss = resp.miss;
                    op.paddr = (!resp.miss).then_some(resp.paddr);
                    if clr {
                        out.clr_bsy[op.lane] = Some(op.uop.rob_idx);
                    }
                }
                FireCategory::StdIncoming => {
                    let mut clr = false;
                    if let Some(e) = self.stq.get_mut(op.uop.stq_idx) {
                        e.data = op.agu_data;
                        clr = e.addr.is_some() && !e.addr_is_virtual && !e.uop.exception;
                    }
                    if clr {
                        let slot = if op.uop.fp_std { self.mem_width } else { op.lane };
                        out.clr_bsy[slot] = Some(op.uop.rob_idx);
                    }
                }
                FireCategory::Sfence => {
                    tlb.sfence();
                    out.clr_bsy[op.lane] = Some(op.uop.rob_idx);
                }
                FireCategory::LoadRetry => {
                    let idx = op.uop.ldq_idx;
                    let Some(vaddr) = self.ldq.get(idx).and_then(|e| e.addr) else {
                        continue;
                    };
                    let resp = tlb.translate(
                        op.lane,
                        &TlbRequest {
                            vaddr,
                            size: op.uop.width,
                            cmd: op.uop.mem_cmd,
                        },
                    );
                    if let Some(x) = resp.fault(false, vaddr) {
                        self.mark_ldq_fault(idx, vaddr, x);
                        continue;
                    }
                    if !resp.miss {
                        if let Some(e) = self.ldq.get_mut(idx) {
                            e.addr = Some(resp.paddr);
                            e.addr_is_virtual = false;
                            e.addr_is_uncacheable = !resp.cacheable;
                        }
                        op.paddr = Some(resp.paddr);
                        op.uncacheable = !resp.cacheable;
                        out.clr_unsafe[op.lane] = Some(op.uop.rob_idx);
                    } else {
                        op.tlb_miss = true;
                    }
                }
                FireCategory::StaRetry => {
                    let idx = op.uop.stq_idx;
                    let Some(vaddr) = self.stq.get(idx).and_then(|e| e.addr) else {
                        continue;
                    };
                    let resp = tlb.translate(
                        op.lane,
                        &TlbRequest {
                            vaddr,
                            size: op.uop.width,
                            cmd: op.uop.mem_cmd,
                        },
                    );
                    if let Some(x) = resp.fault(true, vaddr) {
                        self.mark_stq_fault(idx, vaddr, x);
                        continue;
                    }
                    let mut clr = false;
                    if !resp.miss {
                        if let Some(e) = self.stq.get_mut(idx) {
                            e.addr = Some(resp.paddr);
                            e.addr_is_virtual = false;
                            clr = e.data.is_some();
                        }
                        op.paddr = Some(resp.paddr);
                    } else {
                        op.tlb_miss = true;
                    }
                    if clr {
                        out.clr_bsy[op.lane] = Some(op.uop.rob_idx);
                    }
                }
                FireCategory::HellaIncoming => {
                    let req = inp.hella_req.expect("hella fire without request");
                    let resp = tlb.translate(
                        op.lane,
                        &TlbRequest {
                            vaddr: req.addr,
                            size: req.size,
                            cmd: req.cmd,
                        },
                    );
                    op.tlb_miss = resp.miss;
                    op.paddr = (!resp.miss).then_some(resp.paddr);
                    op.mxcpt = resp.fault(req.cmd.is_write(), req.addr);
                }
                _ => {}
            }
        }
    }

    /// Cache-port issue for this cycle's winners.
    fn run_dcache_issue(
        &mut self,
        inp: &LsuInputs,
        fired: &mut [FiredOp],
        dmem: &mut dyn DCachePort,
        out: &mut LsuOutputs,
    ) {
        for op in fired.iter_mut() {
            match op.cat {
                FireCategory::LoadIncoming | FireCategory::LoadRetry => {
                    let Some(paddr) = op.paddr else { continue };
                    if op.uncacheable {
                        // Parked; the wakeup path fires it at the ROB head.
                        continue;
                    }
                    self.issue_load(op, paddr, dmem, out);
                }
                FireCategory::LoadWakeup => {
                    let idx = op.uop.ldq_idx;
                    let Some(paddr) = self.ldq.get(idx).and_then(|e| e.addr) else {
                        continue;
                    };
                    op.paddr = Some(paddr);
                    self.issue_load(op, paddr, dmem, out);
                }
                FireCategory::StoreCommit => {
                    let idx = self.stq.execute_head();
                    let Some(e) = self.stq.get(idx) else { continue };
                    let req = DmemRequest {
                        addr: e.addr.expect("store commit without address"),
                        data: e.data.expect("store commit without data"),
                        uop: e.uop,
                    };
                    if dmem.try_request(op.lane, req) {
                        op.dc_accepted = true;
                        self.stq.get_mut(idx).unwrap().issued = true;
                        self.stq.advance_execute_head();
                        if self.trace {
                            eprintln!("DC  st[{}] drains", idx);
                        }
                    }
                }
                FireCategory::BndLoad => {
                    if op.uop.uses_mcq {
                        let idx = op.uop.mcq_idx;
                        let Some(e) = self.mcq.get(idx) else { continue };
                        let pac = VirtAddr::new(e.addr.unwrap_or(0)).pac();
                        let addr = hbt_slot_addr(self.hbt_base_addr, pac, e.way);
                        let req = DmemRequest {
                            addr,
                            data: 0,
                            uop: e.uop,
                        };
                        if dmem.try_request(op.lane, req) {
                            op.dc_accepted = true;
                            self.mcq.get_mut(idx).unwrap().executed = true;
                            self.stats.hbt_probes += 1;
                        }
                    } else {
                        let idx = op.uop.bdq_idx;
                        let Some(e) = self.bdq.get(idx) else { continue };
                        let pac = VirtAddr::new(e.addr.unwrap_or(0)).pac();
                        let addr = hbt_slot_addr(self.hbt_base_addr, pac, e.way);
                        let req = DmemRequest {
                            addr,
                            data: 0,
                            uop: e.uop,
                        };
                        if dmem.try_request(op.lane, req) {
                            op.dc_accepted = true;
                            self.bdq.get_mut(idx).unwrap().executed = true;
                            self.stats.hbt_probes += 1;
                        }
                    }
                }
                FireCategory::BndStore => {
                    let idx = op.uop.bdq_idx;
                    let Some(e) = self.bdq.get(idx) else { continue };
                    let pac = VirtAddr::new(e.addr.unwrap_or(0)).pac();
                    // The descriptor lands in the way the occupancy check
                    // settled on.
                    let addr = hbt_slot_addr(self.hbt_base_addr, pac, e.way);
                    let req = DmemRequest {
                        addr,
                        data: e.data.unwrap_or(0),
                        uop: e.uop,
                    };
                    if dmem.try_request(op.lane, req) {
                        op.dc_accepted = true;
                        self.bdq.get_mut(idx).unwrap().executed = true;
                    }
                }
                FireCategory::HellaIncoming => {
                    let req = inp.hella_req.expect("hella fire without request");
                    self.stats.hella_reqs += 1;
                    let mut dc_fired = false;
                    if op.mxcpt.is_none() && !op.tlb_miss {
                        let uop = MicroOp {
                            code: UopCode::Load,
                            mem_cmd: req.cmd,
                            width: req.size,
                            signed_load: req.signed,
                            is_hella: true,
                            ..Default::default()
                        };
                        dc_fired = dmem.try_request(
                            op.lane,
                            DmemRequest {
                                addr: op.paddr.unwrap_or(0),
                                data: req.data,
                                uop,
                            },
                        );
                    }
                    self.hella.accept(
                        req,
                        op.paddr.unwrap_or(0),
                        op.tlb_miss,
                        op.mxcpt,
                        dc_fired,
                    );
                }
                FireCategory::HellaWakeup => {
                    let Some(req) = self.hella.request().copied() else { continue };
                    let uop = self.hella.mem_uop();
                    let accepted = dmem.try_request(
                        op.lane,
                        DmemRequest {
                            addr: self.hella.paddr(),
                            data: req.data,
                            uop,
                        },
                    );
                    if accepted {
                        self.hella.replayed();
                    }
                }
                _ => {}
            }
        }
    }

    /// Issues a load request and arms the speculative wakeup on lane 0.
    fn issue_load(
        &mut self,
        op: &mut FiredOp,
        paddr: u64,
        dmem: &mut dyn DCachePort,
        out: &mut LsuOutputs,
    ) {
        let idx = op.uop.ldq_idx;
        let Some(e) = self.ldq.get(idx) else { return };
        if e.uop.exception || e.succeeded {
            return;
        }
        let uop = e.uop;
        let accepted = dmem.try_request(
            op.lane,
            DmemRequest {
                addr: paddr,
                data: 0,
                uop,
            },
        );
        if accepted {
            op.dc_accepted = true;
            let e = self.ldq.get_mut(idx).unwrap();
            e.executed = true;
            e.execute_ignore = false;
            if op.lane == 0 && uop.dst_type == DstType::Int && uop.dst_reg != 0 {
                out.spec_ld_wakeup = Some(uop.dst_reg);
                self.r_spec_wakeup = Some(SpecWakeup { ldq_idx: idx });
            }
            if self.trace {
                eprintln!("DC  ld[{}] issues addr={:#x}", idx, paddr);
            }
        }
    }

    /// Records a faulting load: the entry parks until the squash.
    fn mark_ldq_fault(&mut self, idx: usize, addr: u64, cause: crate::common::error::MemException) {
        if let Some(e) = self.ldq.get_mut(idx) {
            e.uop.exception = true;
            e.addr = Some(addr);
            e.addr_is_virtual = false;
            let (rob_idx, br_mask) = (e.uop.rob_idx, e.uop.br_mask);
            self.xcpt_candidates.push(ExceptionInfo {
                rob_idx,
                br_mask,
                cause,
            });
        }
    }

    /// Records a faulting store likewise.
    fn mark_stq_fault(&mut self, idx: usize, addr: u64, cause: crate::common::error::MemException) {
        if let Some(e) = self.stq.get_mut(idx) {
            e.uop.exception = true;
            e.addr = Some(addr);
            e.addr_is_virtual = false;
            let (rob_idx, br_mask) = (e.uop.rob_idx, e.uop.br_mask);
            self.xcpt_candidates.push(ExceptionInfo {
                rob_idx,
                br_mask,
                cause,
            });
        }
    }

    /// Cycle-boundary register update: selections, masks, counters.
    fn update_registers(&mut self, inp: &LsuInputs) {
        // The execute cursor never dwells on a dead slot.
        while self.stq.execute_head() != self.stq.tail()
            && self.stq.get(self.stq.execute_head()).is_none()
        {
            self.stq.advance_execute_head();
        }

        let blocked_mask =
            self.block_load_mask | self.p1_block_load_mask | self.p2_block_load_mask;
        let blocked = |i: usize| blocked_mask & (1u64 << i) != 0;

        self.r_ldq_retry_idx = self.ldq.oldest_where(|i, e| {
            e.addr.is_some() && e.addr_is_virtual && !e.uop.exception && !blocked(i)
        });
        let at_head = inp.commit_load_at_rob_head;
        self.r_ldq_wakeup_idx = self.ldq.oldest_where(|i, e| {
            e.addr.is_some()
                && !e.addr_is_virtual
                && !e.executed
                && !e.succeeded
                && !e.uop.exception
                && !blocked(i)
                && (!e.addr_is_uncacheable || (at_head && e.st_dep_mask == 0))
        });
        self.r_stq_retry_idx = self.stq.oldest_where_from(self.stq.commit_head(), |_, e| {
            e.addr.is_some() && e.addr_is_virtual && !e.uop.exception
        });
        self.r_mcq_probe_idx = self
            .mcq
            .oldest_where(|_, e| e.state == McqState::BndChk && !e.executed && e.addr.is_some());
        self.r_bdq_probe_idx = self
            .bdq
            .oldest_where(|_, e| e.state == BdqState::OccChk && !e.executed && e.addr.is_some());
        self.r_bdq_store_idx = self
            .bdq
            .oldest_where(|_, e| e.state == BdqState::BndStr && e.committed && !e.executed);

        self.p2_block_load_mask = self.p1_block_load_mask;
        self.p1_block_load_mask = self.block_load_mask;
        self.block_load_mask = 0;

        if self.lrsc_count > 0 {
            self.lrsc_count -= 1;
        }

        self.r_xcpt =
            oldest_exception(&self.xcpt_candidates, inp.rob_head_idx, self.rob_entries);

        self.stats.cycles += 1;
        self.stats.ldq_occupancy += self.ldq.len() as u64;
        self.stats.stq_occupancy += self.stq.len() as u64;
    }
}
