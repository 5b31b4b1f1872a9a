//! Fire arbitration: which candidates win the memory-lane resources.
//!
//! Each lane owns one TLB port, one cache port, one search (LCAM) port, and
//! one ROB busy-clear slot per cycle. Candidates are considered in a fixed
//! priority order; a candidate fires when every resource it needs is still
//! free on its lane. Categories with disjoint needs can share a lane (an
//! incoming store-data delivery only needs the ROB slot, so a store commit
//! can still use the cache port underneath it).

use crate::core::interface::LsuInputs;
use crate::core::lsu::Lsu;
use crate::core::uop::MicroOp;

/// The fire categories, highest priority first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireCategory {
    /// A newly computed load address.
    LoadIncoming,
    /// A fused store address + data delivery.
    StadIncoming,
    /// A store address delivery.
    StaIncoming,
    /// A store data delivery.
    StdIncoming,
    /// A TLB shootdown.
    Sfence,
    /// A cache-release ordering search.
    Release,
    /// A fresh hella-channel request.
    HellaIncoming,
    /// A hella-channel replay after a nack.
    HellaWakeup,
    /// A load re-translating after a TLB miss.
    LoadRetry,
    /// A store address re-translating after a TLB miss.
    StaRetry,
    /// A committed store draining to memory.
    StoreCommit,
    /// A parked load re-issuing to the cache.
    LoadWakeup,
    /// An HBT probe (bounds check or occupancy check).
    BndLoad,
    /// An HBT descriptor store.
    BndStore,
}

/// Per-lane resource needs of a category: `(tlb, dcache, lcam, rob)`.
fn resources(cat: FireCategory) -> (bool, bool, bool, bool) {
    use FireCategory::*;
    match cat {
        LoadIncoming => (true, true, true, false),
        StadIncoming | StaIncoming => (true, false, true, true),
        StdIncoming => (false, false, false, true),
        Sfence => (true, false, false, true),
        Release => (false, false, true, false),
        HellaIncoming => (true, true, false, false),
        HellaWakeup => (false, true, false, false),
        LoadRetry => (true, true, true, false),
        StaRetry => (true, false, true, true),
        StoreCommit => (false, true, false, false),
        LoadWakeup => (false, true, true, false),
        BndLoad | BndStore => (false, true, false, false),
    }
}

/// A candidate that won its lane's resources this cycle.
///
/// Carries the scratch fields filled in by the later per-cycle stages
/// (translation result, cache acceptance).
#[derive(Clone, Debug)]
pub(crate) struct FiredOp {
    /// Winning category.
    pub cat: FireCategory,
    /// Lane the resources were claimed on.
    pub lane: usize,
    /// Resolved micro-op (incoming copy or queue copy).
    pub uop: MicroOp,
    /// Raw address from address generation (PAC still attached).
    pub agu_addr: Option<u64>,
    /// Data riding with the request (store data, descriptor payload).
    pub agu_data: Option<u64>,
    /// Misalignment fault flagged by address generation (or, for the hella
    /// channel, the translation fault latched for its second stage).
    pub mxcpt: Option<crate::common::error::MemException>,
    /// Physical address after translation (or queue-held physical address).
    pub paddr: Option<u64>,
    /// Translation missed this cycle.
    pub tlb_miss: bool,
    /// Target region is uncacheable.
    pub uncacheable: bool,
    /// The cache accepted the request.
    pub dc_accepted: bool,
}

impl FiredOp {
    fn new(cat: FireCategory, lane: usize, uop: MicroOp) -> Self {
        Self {
            cat,
            lane,
            uop,
            agu_addr: None,
            agu_data: None,
            mxcpt: None,
            paddr: None,
            tlb_miss: false,
            uncacheable: false,
            dc_accepted: false,
        }
    }
}

/// Per-lane resource pool.
struct LanePool {
    tlb: bool,
    dc: bool,
    lcam: bool,
    rob: bool,
}

impl LanePool {
    fn claim(&mut self, cat: FireCategory) -> bool {
        let (t, d, l, r) = resources(cat);
        if (t && !self.tlb) || (d && !self.dc) || (l && !self.lcam) || (r && !self.rob) {
            return false;
        }
        self.tlb &= !t;
        self.dc &= !d;
        self.lcam &= !l;
        self.rob &= !r;
        true
    }
}

impl Lsu {
    /// Returns true if the load at `idx` is fire-blocked this cycle.
    pub(crate) fn load_blocked(&self, idx: usize) -> bool {
        let bit = 1u64 << idx;
        (self.block_load_mask | self.p1_block_load_mask | self.p2_block_load_mask) & bit != 0
    }

    /// Re-validates the registered wakeup selection against current state.
    fn wakeup_valid(&self, idx: usize, inp: &LsuInputs) -> bool {
        let Some(e) = self.ldq.get(idx) else { return false };
        e.addr.is_some()
            && !e.addr_is_virtual
            && !e.executed
            && !e.succeeded
            && !e.uop.exception
            && !self.load_blocked(idx)
            && (!e.addr_is_uncacheable
                || (inp.commit_load_at_rob_head && e.st_dep_mask == 0))
    }

    /// Re-validates the registered load-retry selection.
    fn load_retry_valid(&self, idx: usize) -> bool {
        let Some(e) = self.ldq.get(idx) else { return false };
        e.addr.is_some() && e.addr_is_virtual && !e.uop.exception && !self.load_blocked(idx)
    }

    /// Re-validates the registered store-retry selection.
    fn sta_retry_valid(&self, idx: usize, inp: &LsuInputs) -> bool {
        let Some(e) = self.stq.get(idx) else { return false };
        if !(e.addr.is_some() && e.addr_is_virtual && !e.uop.exception) {
            return false;
        }
        // A data delivery for the same slot owns the queue write this cycle.
        !inp.agu.iter().flatten().any(|a| {
            a.uop.uses_stq && a.data.is_some() && a.uop.stq_idx == idx
        })
    }

    /// Returns the STQ slot ready to drain at the execute cursor, if any.
    fn store_commit_candidate(&self) -> Option<usize> {
        let idx = self.stq.execute_head();
        let e = self.stq.get(idx)?;
        if e.uop.is_fence() || e.succeeded || e.issued || e.uop.exception {
            return None;
        }
        let prepared = e.addr.is_some() && !e.addr_is_virtual && e.data.is_some();
        let ready = e.committed || (e.uop.is_amo() && prepared);
        (ready && prepared).then_some(idx)
    }

    /// Runs the fire-selection rule for every lane.
    pub(crate) fn select_fires(&mut self, inp: &LsuInputs) -> Vec<FiredOp> {
        let last = self.mem_width - 1;
        let mut fired = Vec::new();

        for lane in 0..self.mem_width {
            let mut pool = LanePool {
                tlb: true,
                dc: true,
                lcam: true,
                rob: true,
            };

            // Incoming address-generation traffic, bound to its lane.
            if let Some(agu) = inp.agu.get(lane).and_then(|a| a.as_ref()) {
                let cat = if agu.is_sfence {
                    Some(FireCategory::Sfence)
                } else if agu.uop.uses_ldq && agu.addr.is_some() {
                    Some(FireCategory::LoadIncoming)
                } else if agu.uop.uses_stq && agu.addr.is_some() && agu.data.is_some() {
                    Some(FireCategory::StadIncoming)
                } else if agu.uop.uses_stq && agu.addr.is_some() {
                    Some(FireCategory::StaIncoming)
                } else if agu.uop.uses_stq && agu.data.is_some() {
                    Some(FireCategory::StdIncoming)
                } else {
                    None
                };
                if let Some(cat) = cat {
                    if pool.claim(cat) {
                        let mut op = FiredOp::new(cat, lane, agu.uop);
                        op.agu_addr = agu.addr;
                        op.agu_data = agu.data;
                        op.mxcpt = agu.mxcpt;
                        fired.push(op);
                        if cat == FireCategory::LoadIncoming {
                            self.block_load_mask |= 1u64 << agu.uop.ldq_idx;
                        }
                    }
                }
            }

            // Release search rides the last lane's LCAM port; unconsumed
            // events queue up behind the port (backpressure).
            if lane == last {
                if let Some(&block) = self.pending_releases.front() {
                    if pool.claim(FireCategory::Release) {
                        let mut op =
                            FiredOp::new(FireCategory::Release, lane, MicroOp::default());
                        op.paddr = Some(block);
                        fired.push(op);
                        self.pending_releases.pop_front();
                    }
                }

                if self.hella.is_ready() && inp.hella_req.is_some() {
                    if pool.claim(FireCategory::HellaIncoming) {
                        fired.push(FiredOp::new(
                            FireCategory::HellaIncoming,
                            lane,
                            MicroOp::default(),
                        ));
                    }
                } else if self.hella.wants_replay() && pool.claim(FireCategory::HellaWakeup) {
                    fired.push(FiredOp::new(
                        FireCategory::HellaWakeup,
                        lane,
                        MicroOp::default(),
                    ));
                }

                if let Some(idx) = self.r_ldq_retry_idx {
                    if self.load_retry_valid(idx) && pool.claim(FireCategory::LoadRetry) {
                        let uop = self.ldq.get(idx).unwrap().uop;
                        fired.push(FiredOp::new(FireCategory::LoadRetry, lane, uop));
                        self.block_load_mask |= 1u64 << idx;
                        self.stats.tlb_retries += 1;
                    }
                }

                if let Some(idx) = self.r_stq_retry_idx {
                    if self.sta_retry_valid(idx, inp) && pool.claim(FireCategory::StaRetry) {
                        let uop = self.stq.get(idx).unwrap().uop;
                        fired.push(FiredOp::new(FireCategory::StaRetry, lane, uop));
                        self.stats.tlb_retries += 1;
                    }
                }
            }

            // Store drain owns lane 0.
            if lane == 0 {
                if let Some(idx) = self.store_commit_candidate() {
                    if pool.claim(FireCategory::StoreCommit) {
                        let uop = self.stq.get(idx).unwrap().uop;
                        fired.push(FiredOp::new(FireCategory::StoreCommit, lane, uop));
                    }
                }
            }

            if lane == last {
                if let Some(idx) = self.r_ldq_wakeup_idx {
                    if self.wakeup_valid(idx, inp) && pool.claim(FireCategory::LoadWakeup) {
                        let uop = self.ldq.get(idx).unwrap().uop;
                        fired.push(FiredOp::new(FireCategory::LoadWakeup, lane, uop));
                        self.block_load_mask |= 1u64 << idx;
                        self.stats.load_wakeups += 1;
                    }
                }

                // Bounds traffic sits at the bottom and respects the
                // reservation window.
                if self.wyfy_enable && self.lrsc_count == 0 {
                    let mcq_ok = self
                        .r_mcq_probe_idx
                        .map(|i| {
                            self.mcq.get(i).is_some_and(|e| {
                                e.state == crate::core::queues::McqState::BndChk
                                    && !e.executed
                                    && e.addr.is_some()
                            })
                        })
                        .unwrap_or(false);
                    let bdq_probe_ok = self
                        .r_bdq_probe_idx
                        .map(|i| {
                            self.bdq.get(i).is_some_and(|e| {
                                e.state == crate::core::queues::BdqState::OccChk
                                    && !e.executed
                                    && e.addr.is_some()
                            })
                        })
                        .unwrap_or(false);
                    if (mcq_ok || bdq_probe_ok) && pool.claim(FireCategory::BndLoad) {
                        // The memory-check side is drained ahead of new
                        // descriptor work.
                        let uop = if mcq_ok {
                            self.mcq.get(self.r_mcq_probe_idx.unwrap()).unwrap().uop
                        } else {
                            self.bdq.get(self.r_bdq_probe_idx.unwrap()).unwrap().uop
                        };
                        fired.push(FiredOp::new(FireCategory::BndLoad, lane, uop));
                    }

                    let bdq_store_ok = self
                        .r_bdq_store_idx
                        .map(|i| {
                            self.bdq.get(i).is_some_and(|e| {
                                e.state == crate::core::queues::BdqState::BndStr
                                    && e.committed
                                    && !e.executed
                            })
                        })
                        .unwrap_or(false);
                    if bdq_store_ok && pool.claim(FireCategory::BndStore) {
                        let uop = self.bdq.get(self.r_bdq_store_idx.unwrap()).unwrap().uop;
                        fired.push(FiredOp::new(FireCategory::BndStore, lane, uop));
                    }
                }
            }
        }

        if self.trace {
            for op in &fired {
                eprintln!("ARB lane={} fire {:?} rob={}", op.lane, op.cat, op.uop.rob_idx);
            }
        }
        fired
    }
}
