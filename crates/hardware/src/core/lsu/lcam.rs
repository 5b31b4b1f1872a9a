//! The associative search engine for memory ordering and forwarding.
//!
//! Every fired load and store-address op searches the queues in the same
//! cycle its translation completes:
//! 1. **Release search:** marks loads whose cache block became externally
//!    visible; a later ordering conflict on an observed load is a real
//!    violation, not a benign replay.
//! 2. **Store search:** finds younger loads that already read bytes this
//!    store writes. A completed load takes an ordering failure; an in-flight
//!    one drops its upcoming response.
//! 3. **Load search:** enforces same-address load-load order against
//!    observed entries, and collects the overlapping older stores feeding
//!    the forwarding age select.

use crate::common::addr::{block_addr, dword_addr};
use crate::common::error::{ExceptionInfo, MemException};
use crate::common::mask::{gen_byte_mask, is_older, mask_subset, masks_overlap};
use crate::core::interface::DCachePort;
use crate::core::lsu::arbiter::{FireCategory, FiredOp};
use crate::core::lsu::forward::{ForwardSel, WbForward, select_forward};
use crate::core::lsu::Lsu;

impl Lsu {
    /// Runs all searches for this cycle's fired operations.
    pub(crate) fn run_lcam(&mut self, fired: &[FiredOp], dmem: &mut dyn DCachePort) {
        for op in fired {
            match op.cat {
                FireCategory::Release => {
                    if let Some(block) = op.paddr {
                        self.release_search(block);
                    }
                }
                FireCategory::StaIncoming
                | FireCategory::StadIncoming
                | FireCategory::StaRetry => {
                    if let Some(paddr) = op.paddr {
                        self.store_search(op.uop.stq_idx, paddr, op.uop.width.bytes());
                    }
                }
                FireCategory::LoadIncoming
                | FireCategory::LoadRetry
                | FireCategory::LoadWakeup => {
                    if let Some(paddr) = op.paddr {
                        self.load_search(op, paddr, dmem);
                    }
                }
                _ => {}
            }
        }
    }

    /// Marks every load holding an address in the released block.
    fn release_search(&mut self, block: u64) {
        let bb = self.block_bytes;
        self.ldq.for_each_valid(|_, e| {
            if let Some(addr) = e.addr {
                if !e.addr_is_virtual && block_addr(addr, bb) == block {
                    e.observed = true;
                }
            }
        });
    }

    /// Store-address search: catches younger loads that ran too early.
    fn store_search(&mut self, s_idx: usize, paddr: u64, size_bytes: usize) {
        let smask = gen_byte_mask(paddr, size_bytes);
        let dword = dword_addr(paddr);
        let stq_head = self.stq.head();

        // Forwards still in flight count as forwards for the check.
        let mut pending_fwd = [None::<usize>; 64];
        for wf in self.wb_forward.iter().flatten() {
            pending_fwd[wf.ldq_idx] = Some(wf.stq_idx);
        }
        let mut cancel_pending: Vec<usize> = Vec::new();

        for i in 0..self.ldq.capacity() {
            let Some(l) = self.ldq.get(i) else { continue };
            // Only loads that depend on this store (it is older) matter.
            if l.st_dep_mask & (1u64 << s_idx) == 0 {
                continue;
            }
            let Some(laddr) = l.addr else { continue };
            if l.addr_is_virtual {
                continue;
            }
            let lmask = gen_byte_mask(laddr, l.uop.width.bytes());
            if dword_addr(laddr) != dword || !masks_overlap(lmask, smask) {
                continue;
            }

            let fwd_idx = if l.forward_std_val {
                Some(l.forward_stq_idx)
            } else {
                pending_fwd[i]
            };
            // The load is safe only if it forwarded from this store, or from
            // a store younger than this one (which hides this store's data).
            let unsafe_fwd = match fwd_idx {
                None => true,
                Some(f) if f == s_idx => false,
                Some(f) => is_older(f, s_idx, stq_head),
            };
            if !unsafe_fwd {
                continue;
            }

            if l.succeeded {
                let (rob_idx, br_mask) = (l.uop.rob_idx, l.uop.br_mask);
                let le = self.ldq.get_mut(i).unwrap();
                if !le.order_fail {
                    le.order_fail = true;
                    self.stats.order_fails += 1;
                    self.xcpt_candidates.push(ExceptionInfo {
                        rob_idx,
                        br_mask,
                        cause: MemException::MemOrdering(laddr),
                    });
                    if self.trace {
                        eprintln!("CAM st[{}] fails ld[{}] addr={:#x}", s_idx, i, laddr);
                    }
                }
            } else if l.executed {
                self.ldq.get_mut(i).unwrap().execute_ignore = true;
            } else if pending_fwd[i].is_some() {
                // A stale forward is queued up: cancel it and retry the load.
                cancel_pending.push(i);
            }
        }

        for ldq_idx in cancel_pending {
            for slot in self.wb_forward.iter_mut() {
                if slot.is_some_and(|wf| wf.ldq_idx == ldq_idx) {
                    *slot = None;
                }
            }
            if let Some(le) = self.ldq.get_mut(ldq_idx) {
                le.executed = false;
            }
        }
    }

    /// Load search: load-load ordering plus forwarding-match collection.
    fn load_search(&mut self, op: &FiredOp, paddr: u64, dmem: &mut dyn DCachePort) {
        let s_idx = op.uop.ldq_idx;
        let lmask = gen_byte_mask(paddr, op.uop.width.bytes());
        let dword = dword_addr(paddr);
        let ldq_head = self.ldq.head();
        let mut kill_searcher = false;

        for i in 0..self.ldq.capacity() {
            if i == s_idx {
                continue;
            }
            let Some(e) = self.ldq.get(i) else { continue };
            let Some(eaddr) = e.addr else { continue };
            if e.addr_is_virtual {
                continue;
            }
            let emask = gen_byte_mask(eaddr, e.uop.width.bytes());
            if dword_addr(eaddr) != dword || !masks_overlap(emask, lmask) {
                continue;
            }

            if is_older(s_idx, i, ldq_head) {
                // The searcher is older. A younger load that already read
                // this address is only wrong if the block was observed in
                // between.
                let nacking = self.nacking_loads & (1u64 << i) != 0;
                if (e.executed || e.succeeded) && e.observed && !nacking {
                    let (rob_idx, br_mask, succeeded) =
                        (e.uop.rob_idx, e.uop.br_mask, e.succeeded);
                    let ee = self.ldq.get_mut(i).unwrap();
                    if succeeded {
                        if !ee.order_fail {
                            ee.order_fail = true;
                            self.stats.order_fails += 1;
                            self.xcpt_candidates.push(ExceptionInfo {
                                rob_idx,
                                br_mask,
                                cause: MemException::MemOrdering(eaddr),
                            });
                        }
                    } else {
                        ee.execute_ignore = true;
                    }
                }
            } else {
                // The searcher is younger. It must not complete ahead of an
                // older same-address load that has not (successfully)
                // executed.
                let nacking = self.nacking_loads & (1u64 << i) != 0;
                if !(e.executed && !e.execute_ignore) || nacking {
                    kill_searcher = true;
                }
            }
        }

        if kill_searcher {
            if op.dc_accepted {
                dmem.kill(op.lane);
            }
            if let Some(le) = self.ldq.get_mut(s_idx) {
                le.executed = false;
            }
            self.wb_forward[op.lane] = None;
            if self.trace {
                eprintln!("CAM ld[{}] killed by older unexecuted load", s_idx);
            }
            return;
        }

        // Forwarding-match collection over the store queue. Uncacheable
        // loads read the device, never the store queue.
        let (st_dep_mask, youngest) = {
            let Some(l) = self.ldq.get(s_idx) else { return };
            if l.addr_is_uncacheable {
                return;
            }
            (l.st_dep_mask, l.youngest_stq_idx)
        };
        let mut addr_matches: u64 = 0;
        let mut fwd_matches: u64 = 0;

        for k in 0..self.stq.capacity() {
            if st_dep_mask & (1u64 << k) == 0 {
                continue;
            }
            let Some(s) = self.stq.get(k) else { continue };
            // A fence carries no address: it blocks every dependent load
            // until it drains.
            if s.uop.is_fence() {
                addr_matches |= 1u64 << k;
                continue;
            }
            let Some(saddr) = s.addr else { continue };
            if s.addr_is_virtual {
                continue;
            }
            if dword_addr(saddr) != dword {
                continue;
            }
            let smask = gen_byte_mask(saddr, s.uop.width.bytes());
            if !masks_overlap(lmask, smask) {
                continue;
            }
            addr_matches |= 1u64 << k;
            if !s.uop.is_fence() && !s.uop.is_amo() && mask_subset(lmask, smask) {
                fwd_matches |= 1u64 << k;
            }
        }

        match select_forward(addr_matches, fwd_matches, youngest, self.stq.capacity()) {
            ForwardSel::None => {}
            ForwardSel::Forward(stq_idx) => {
                // The store supplies the data; the cache access is redundant.
                if op.dc_accepted {
                    dmem.kill(op.lane);
                }
                let le = self.ldq.get_mut(s_idx).unwrap();
                le.executed = false;
                self.wb_forward[op.lane] = Some(WbForward {
                    ldq_idx: s_idx,
                    stq_idx,
                });
                if self.trace {
                    eprintln!("CAM ld[{}] forwards from st[{}]", s_idx, stq_idx);
                }
            }
            ForwardSel::Block(stq_idx) => {
                // Partial overlap (or a fence/atomic): the load must wait
                // for the store to drain, then wake up.
                if op.dc_accepted {
                    dmem.kill(op.lane);
                }
                let le = self.ldq.get_mut(s_idx).unwrap();
                le.executed = false;
                self.wb_forward[op.lane] = None;
                if self.trace {
                    eprintln!("CAM ld[{}] blocked by st[{}] (partial)", s_idx, stq_idx);
                }
            }
        }
    }
}
