//! Commit, retirement, and squash.
//!
//! The commit stream marks stores (and their shadow checks) committed and
//! dequeues loads at the LDQ head. Committed stores drain through the
//! execute cursor and leave the queue once the cache acknowledges them; a
//! committed fence leaves once the cache reports global ordering. The MCQ
//! and BDQ retire from their heads when committed and complete, updating
//! the counter CSRs. Branch misprediction restores the four tails saved at
//! the branch; an exception wipes all speculative state in one edge.

use crate::core::interface::{LsuInputs, LsuOutputs};
use crate::core::lsu::Lsu;
use crate::core::uop::UopCode;

impl Lsu {
    /// Applies the commit stream and retires completed queue heads.
    pub(crate) fn run_commit(&mut self, inp: &LsuInputs, out: &mut LsuOutputs) {
        for c in inp.commit.iter().flatten() {
            if c.uses_stq {
                if let Some(e) = self.stq.get_mut(c.stq_idx) {
                    e.committed = true;
                }
            } else if c.uses_ldq {
                debug_assert_eq!(
                    self.ldq.head(),
                    c.ldq_idx,
                    "loads must commit in queue order"
                );
                if let Some(e) = self.ldq.dequeue_head() {
                    debug_assert!(
                        e.succeeded && (e.executed || e.forward_std_val),
                        "committing a load that never produced data"
                    );
                    self.stats.num_mem_req += 1;
                    self.stats.num_mem_size += e.uop.width.bytes() as u64;
                    if self.trace {
                        eprintln!("CMT ld[{}] retired", c.ldq_idx);
                    }
                }
            }

            if (c.uses_ldq || c.uses_stq) && !c.is_fence() && c.uses_mcq {
                if let Some(e) = self.mcq.get_mut(c.mcq_idx) {
                    e.committed = true;
                }
            }
            if c.uses_bdq {
                if let Some(e) = self.bdq.get_mut(c.bdq_idx) {
                    e.committed = true;
                }
            }
        }

        self.stq.advance_commit_head();

        // Drain the store-queue head: one dequeue per cycle.
        let head_idx = self.stq.head();
        let deq = self.stq.get(head_idx).is_some_and(|e| {
            e.committed
                && (e.succeeded
                    || (e.uop.is_fence() && (self.dmem_ordered || self.stq.len() == 1 && inp.fence_dmem)))
        });
        if deq {
            let e = self.stq.dequeue_head().expect("checked head");
            if !e.uop.is_fence() {
                self.stats.num_mem_req += 1;
                self.stats.num_mem_size += e.uop.width.bytes() as u64;
            }
            // The drained slot is no longer a live store: release the
            // dependence bit everywhere.
            let bit = !(1u64 << head_idx);
            self.ldq.for_each_valid(|_, l| l.st_dep_mask &= bit);
            self.live_store_mask &= bit;
            if self.trace {
                eprintln!("CMT st[{}] left the queue", head_idx);
            }
        }

        // Shadow queues retire behind the primary queues.
        if let Some(m) = self.mcq.dequeue_ready() {
            if m.signed {
                self.stats.num_signed_inst += 1;
            } else {
                self.stats.num_unsigned_inst += 1;
            }
        }
        if let Some(b) = self.bdq.dequeue_ready() {
            match b.uop.code {
                UopCode::BndStr => self.stats.num_bndstr += 1,
                UopCode::BndClr => self.stats.num_bndclr += 1,
                UopCode::BndSrch => self.stats.num_bndsrch += 1,
                _ => {}
            }
        }

        out.fencei_rdy = self.stq.is_empty();
        out.force_order = self
            .stq
            .get(self.stq.head())
            .is_some_and(|e| e.uop.is_fence() && e.committed);
    }

    /// Applies branch resolution and exception squash.
    pub(crate) fn run_kill(&mut self, inp: &LsuInputs) {
        if let Some(br) = inp.brinfo {
            let squashed = br.mispredict && !inp.exception;
            if squashed {
                self.ldq.retract_tail_to(br.ldq_tail);
                self.stq.retract_tail_to(br.stq_tail);
                self.mcq.retract_tail_to(br.mcq_tail);
                self.bdq.retract_tail_to(br.bdq_tail);
                // Forwards aimed at killed entries die with them.
                for slot in self.wb_forward.iter_mut() {
                    if slot.is_some_and(|wf| self.ldq.get(wf.ldq_idx).is_none()) {
                        *slot = None;
                    }
                }
                if self.trace {
                    eprintln!(
                        "KIL branch restores tails ldq={} stq={} mcq={} bdq={}",
                        br.ldq_tail, br.stq_tail, br.mcq_tail, br.bdq_tail
                    );
                }
            }
            // Survivors shed the resolved branch's bit. The tail restore is
            // exact: after a squash, nothing left standing may still depend
            // on the mispredicted branch.
            self.ldq.for_each_valid(|i, e| {
                debug_assert!(
                    !squashed || !e.uop.killed_by(&br),
                    "killed LDQ entry {} survived the tail restore",
                    i
                );
                e.uop.clear_branch(&br);
            });
            self.stq.for_each_valid(|i, e| {
                debug_assert!(
                    !squashed || !e.uop.killed_by(&br),
                    "killed STQ entry {} survived the tail restore",
                    i
                );
                e.uop.clear_branch(&br);
            });
            self.mcq.for_each_valid(|i, e| {
                debug_assert!(
                    !squashed || !e.uop.killed_by(&br),
                    "killed MCQ entry {} survived the tail restore",
                    i
                );
                e.uop.clear_branch(&br);
            });
            self.bdq.for_each_valid(|i, e| {
                debug_assert!(
                    !squashed || !e.uop.killed_by(&br),
                    "killed BDQ entry {} survived the tail restore",
                    i
                );
                e.uop.clear_branch(&br);
            });
        }

        if inp.exception {
            self.ldq.flush_all();
            self.stq.flush_speculative();
            self.mcq.flush_all();
            self.bdq.flush_all();
            for slot in self.wb_forward.iter_mut() {
                *slot = None;
            }
            self.r_spec_wakeup = None;
            if self.trace {
                eprintln!("KIL exception squash");
            }
        }

        // The live-store set is exactly the occupied STQ slots.
        let mut mask = 0u64;
        for k in 0..self.stq.capacity() {
            if self.stq.get(k).is_some() {
                mask |= 1u64 << k;
            }
        }
        self.live_store_mask = mask;
    }
}
