//! Dispatch stage: queue allocation for incoming micro-ops.
//!
//! Lanes are walked left to right so a load dispatched on lane 1 sees a
//! store dispatched on lane 0 of the same cycle in its dependence mask.
//! Memory-touching micro-ops additionally shadow-allocate a memory-check
//! entry; descriptor ops allocate a BDQ entry. Excepted micro-ops are
//! dropped without allocating anything.

use crate::core::interface::{LsuInputs, LsuOutputs};
use crate::core::lsu::Lsu;
use crate::core::uop::{MemCmd, MemWidth, MicroOp};

impl Lsu {
    /// Runs the dispatch walk for one cycle.
    pub(crate) fn run_dispatch(&mut self, inp: &LsuInputs, out: &mut LsuOutputs) {
        // Running image of the live-store set as this cycle's stores join it.
        let mut next_live_store_mask = self.live_store_mask;

        for lane in 0..self.core_width {
            out.ldq_full[lane] = self.ldq.is_full();
            out.stq_full[lane] = self.stq.is_full();
            out.mcq_full[lane] = self.mcq.is_full();
            out.bdq_full[lane] = self.bdq.is_full();

            let Some(uop) = inp.dispatch.get(lane).and_then(|d| d.as_ref()) else {
                continue;
            };
            assert!(
                !(uop.uses_ldq && uop.uses_stq),
                "micro-op claims both LDQ and STQ"
            );

            if uop.exception {
                continue;
            }

            let mut uop = *uop;

            // The co-engine shadows every non-fence memory op.
            let wants_mcq = self.wyfy_enable && uop.touches_memory() && !uop.is_fence();

            // Refuse the whole op if any queue it needs has no room.
            let blocked = (uop.uses_ldq && self.ldq.is_full())
                || (uop.uses_stq && self.stq.is_full())
                || (wants_mcq && self.mcq.is_full())
                || (uop.uses_bdq && (self.bdq.is_full() || !self.wyfy_enable));
            if blocked {
                continue;
            }

            if uop.uses_ldq {
                let youngest = self.stq.tail();
                let idx = self
                    .ldq
                    .allocate(uop, next_live_store_mask, youngest)
                    .expect("LDQ allocate after full check");
                uop.ldq_idx = idx;
                self.ldq.get_mut(idx).unwrap().uop.ldq_idx = idx;
                self.stats.loads_dispatched += 1;
            }

            if uop.uses_stq {
                let idx = self.stq.allocate(uop).expect("STQ allocate after full check");
                uop.stq_idx = idx;
                self.stq.get_mut(idx).unwrap().uop.stq_idx = idx;
                next_live_store_mask |= 1u64 << idx;
                self.stats.stores_dispatched += 1;
            }

            if wants_mcq {
                // The shadow check is a synthetic byte read of the pointer;
                // it rides the cache port under its own queue identity.
                let mut mcq_uop = uop;
                mcq_uop.mem_cmd = MemCmd::Read;
                mcq_uop.width = MemWidth::Byte;
                mcq_uop.uses_mcq = true;
                mcq_uop.uses_ldq = false;
                mcq_uop.uses_stq = false;
                let idx = self
                    .mcq
                    .allocate(mcq_uop, uop.pac_signed)
                    .expect("MCQ allocate after full check");
                uop.uses_mcq = true;
                uop.mcq_idx = idx;
                self.mcq.get_mut(idx).unwrap().uop.mcq_idx = idx;
                // Keep the queue copies' routing in sync.
                if uop.uses_ldq {
                    self.ldq.get_mut(uop.ldq_idx).unwrap().uop = uop;
                }
                if uop.uses_stq {
                    self.stq.get_mut(uop.stq_idx).unwrap().uop = uop;
                }
            }

            if uop.uses_bdq {
                let idx = self
                    .bdq
                    .allocate(uop, uop.pac_signed)
                    .expect("BDQ allocate after full check");
                uop.bdq_idx = idx;
                self.bdq.get_mut(idx).unwrap().uop.bdq_idx = idx;
            }

            out.dispatched[lane] = Some(uop);

            if self.trace {
                eprintln!(
                    "DIS lane={} rob={} ldq={:?} stq={:?} mcq={:?} bdq={:?}",
                    lane,
                    uop.rob_idx,
                    uop.uses_ldq.then_some(uop.ldq_idx),
                    uop.uses_stq.then_some(uop.stq_idx),
                    uop.uses_mcq.then_some(uop.mcq_idx),
                    uop.uses_bdq.then_some(uop.bdq_idx),
                );
            }
        }

        self.live_store_mask = next_live_store_mask;
    }

    /// Routes address-generation deliveries into the co-engine queues.
    ///
    /// The MCQ and BDQ receive the raw tagged pointer; the PAC is stripped
    /// only on the path to the DTLB.
    pub(crate) fn run_agu_delivery(&mut self, inp: &LsuInputs) {
        for agu in inp.agu.iter().flatten() {
            let uop: &MicroOp = &agu.uop;
            let Some(addr) = agu.addr else { continue };

            if uop.uses_mcq {
                if let Some(entry) = self.mcq.get_mut(uop.mcq_idx) {
                    entry.deliver_addr(addr);
                }
            }
            if uop.uses_bdq {
                if let Some(entry) = self.bdq.get_mut(uop.bdq_idx) {
                    entry.deliver_addr(addr, agu.data);
                }
            }
        }
    }
}
