//! Writeback: cache responses, nacks, and forward completion.
//!
//! Responses arrive one cycle (or more) after their request left. Loads are
//! extended and presented on the integer or FP response channel; stores are
//! marked drained; bounds probes feed the MCQ/BDQ state machines through the
//! injected policy predicates. A load flagged `execute_ignore` drops its
//! response on the floor and re-arms. Forwarding decisions latched by the
//! search engine complete here, splicing store-queue data into the load's
//! writeback if the cache port did not deliver first.

use crate::core::interface::{DmemResponse, ExecResponse, LsuInputs, LsuOutputs};
use crate::core::lsu::Lsu;
use crate::core::lsu::forward::forward_data;
use crate::common::error::{ExceptionInfo, MemException};
use crate::core::queues::{BdqState, McqState, OccOutcome, ProbeOutcome};
use crate::core::uop::{DstType, MemCmd, MemWidth};

impl Lsu {
    /// Processes this cycle's cache outputs and pending forwards.
    pub(crate) fn run_writeback(&mut self, inp: &LsuInputs, out: &mut LsuOutputs) {
        self.dmem_ordered = inp.dmem.ordered;
        if let Some(block) = inp.dmem.release {
            self.pending_releases.push_back(block);
        }

        // Nacks first: a nacked load must not look "executing" to the
        // searches that run later this cycle.
        for nack in &inp.dmem.nacks {
            let uop = &nack.uop;
            self.stats.nacks += 1;
            if uop.is_hella {
                self.hella.on_nack();
            } else if uop.uses_mcq && !uop.uses_ldq && !uop.uses_stq {
                if let Some(e) = self.mcq.get_mut(uop.mcq_idx) {
                    e.executed = false;
                }
            } else if uop.uses_bdq {
                if let Some(e) = self.bdq.get_mut(uop.bdq_idx) {
                    e.executed = false;
                }
            } else if uop.uses_ldq {
                if let Some(e) = self.ldq.get_mut(uop.ldq_idx) {
                    e.executed = false;
                    e.execute_ignore = false;
                    self.nacking_loads |= 1u64 << uop.ldq_idx;
                }
            } else if uop.uses_stq {
                self.stq.rewind_execute_head(uop.stq_idx);
                if self.trace {
                    eprintln!("WB  st[{}] nacked, execute head rewound", uop.stq_idx);
                }
            }
        }

        for resp in &inp.dmem.responses {
            self.handle_response(resp, out);
        }

        // A speculative wakeup from last cycle must see its data on lane 0
        // now, or the issue window replays the dependents.
        if let Some(sw) = self.r_spec_wakeup.take() {
            let delivered = out.iresp[0]
                .as_ref()
                .is_some_and(|r| r.uop.uses_ldq && r.uop.ldq_idx == sw.ldq_idx);
            if !delivered {
                out.ld_miss = true;
            }
        }

        self.complete_forwards(out);
    }

    /// Routes one cache response.
    fn handle_response(&mut self, resp: &DmemResponse, out: &mut LsuOutputs) {
        let uop = &resp.uop;

        if uop.is_hella {
            if let Some(hr) = self.hella.on_response(resp.data) {
                out.hella_resp = Some(hr);
            }
            return;
        }

        // Probe uops carry only their queue flag; the original op's flags
        // were cleared when the synthetic read was built.
        if uop.uses_mcq && !uop.uses_ldq && !uop.uses_stq {
            self.handle_mcq_response(uop.mcq_idx, resp.data);
            return;
        }
        if uop.uses_bdq {
            self.handle_bdq_response(uop.bdq_idx, resp.data);
            return;
        }

        if uop.uses_ldq {
            let idx = uop.ldq_idx;
            let Some(e) = self.ldq.get_mut(idx) else {
                return; // killed in flight
            };
            if e.execute_ignore {
                // Stale data relative to a store found after issue: drop it
                // and let the load re-issue.
                e.executed = false;
                e.execute_ignore = false;
                return;
            }
            if !e.executed {
                return; // response for a cancelled request
            }
            let data = extend_load(resp.data, e.uop.width, e.uop.signed_load, e.uop.dst_type);
            e.succeeded = true;
            e.debug_wb_data = data;
            if e.uop.mem_cmd == MemCmd::Lr {
                self.lrsc_count = self.lrsc_cycles;
            }
            let exec = ExecResponse { uop: e.uop, data };
            match e.uop.dst_type {
                DstType::Float => out.fresp[resp.lane] = Some(exec),
                DstType::Int => out.iresp[resp.lane] = Some(exec),
                DstType::None => {}
            }
            if self.trace {
                eprintln!("WB  ld[{}] data={:#x}", idx, data);
            }
            return;
        }

        if uop.uses_stq {
            let idx = uop.stq_idx;
            let Some(e) = self.stq.get_mut(idx) else {
                return;
            };
            e.succeeded = true;
            // Atomics and store-conditionals return a value to the core.
            if (e.uop.is_amo() || e.uop.mem_cmd == MemCmd::Sc) && e.uop.dst_type == DstType::Int
            {
                let data = extend_load(resp.data, e.uop.width, e.uop.signed_load, DstType::Int);
                out.iresp[resp.lane] = Some(ExecResponse { uop: e.uop, data });
            }
            if self.trace {
                eprintln!("WB  st[{}] ack", idx);
            }
        }
    }

    /// Applies a bounds-probe response through the injected predicate.
    fn handle_mcq_response(&mut self, idx: usize, data: u64) {
        let Some(e) = self.mcq.get_mut(idx) else { return };
        if e.state != McqState::BndChk || !e.executed {
            return;
        }
        let matched = self.policy.bnd_check(data, e);
        let e = self.mcq.get_mut(idx).unwrap();
        match e.probe_response(matched, self.hbt_num_way) {
            ProbeOutcome::Fail => {
                let (rob_idx, br_mask) = (e.uop.rob_idx, e.uop.br_mask);
                let addr = e.addr.unwrap_or(0);
                self.xcpt_candidates.push(ExceptionInfo {
                    rob_idx,
                    br_mask,
                    cause: MemException::BoundsFail(addr),
                });
                if self.trace {
                    eprintln!("WB  mcq[{}] exhausted all ways", idx);
                }
            }
            ProbeOutcome::Done | ProbeOutcome::Retry => {}
        }
    }

    /// Applies an occupancy-probe or descriptor-store response.
    fn handle_bdq_response(&mut self, idx: usize, data: u64) {
        let Some(e) = self.bdq.get_mut(idx) else { return };
        if !e.executed {
            return;
        }
        match e.state {
            BdqState::OccChk => {
                let usable = self.policy.occ_check(data, e);
                let e = self.bdq.get_mut(idx).unwrap();
                match e.occ_response(usable, self.hbt_num_way) {
                    OccOutcome::Fail => {
                        let (rob_idx, br_mask) = (e.uop.rob_idx, e.uop.br_mask);
                        let addr = e.addr.unwrap_or(0);
                        self.xcpt_candidates.push(ExceptionInfo {
                            rob_idx,
                            br_mask,
                            cause: MemException::OccupancyFail(addr),
                        });
                    }
                    OccOutcome::SlotFound | OccOutcome::Retry => {}
                }
            }
            BdqState::BndStr => {
                e.store_response();
                if self.trace {
                    eprintln!("WB  bdq[{}] descriptor written", idx);
                }
            }
            _ => {}
        }
    }

    /// Completes forwarding decisions latched by last cycle's search.
    fn complete_forwards(&mut self, out: &mut LsuOutputs) {
        for lane in 0..self.mem_width {
            let Some(wf) = self.wb_forward[lane].take() else {
                continue;
            };

            let (succeeded, execute_ignore, laddr, width, signed, dst_type) = {
                let Some(l) = self.ldq.get(wf.ldq_idx) else {
                    continue; // load killed in flight
                };
                (
                    l.succeeded,
                    l.execute_ignore,
                    l.addr,
                    l.uop.width,
                    l.uop.signed_load,
                    l.uop.dst_type,
                )
            };
            if succeeded {
                continue;
            }
            if execute_ignore {
                let le = self.ldq.get_mut(wf.ldq_idx).unwrap();
                le.executed = false;
                le.execute_ignore = false;
                continue;
            }
            // The response channel carries at most one writeback per lane.
            let channel_busy = match dst_type {
                DstType::Float => out.fresp[lane].is_some(),
                _ => out.iresp[lane].is_some(),
            };
            if channel_busy {
                if let Some(le) = self.ldq.get_mut(wf.ldq_idx) {
                    le.executed = false;
                }
                continue;
            }

            let Some(laddr) = laddr else { continue };

            let Some((sdata, saddr)) = self
                .stq
                .get(wf.stq_idx)
                .and_then(|s| Some((s.data?, s.addr?)))
            else {
                // Store data not ready (or store gone): the load re-issues.
                if let Some(le) = self.ldq.get_mut(wf.ldq_idx) {
                    le.executed = false;
                }
                continue;
            };

            let data = extend_box(
                forward_data(sdata, saddr, laddr, width, signed),
                width,
                dst_type,
            );
            let le = self.ldq.get_mut(wf.ldq_idx).unwrap();
            le.succeeded = true;
            le.forward_std_val = true;
            le.forward_stq_idx = wf.stq_idx;
            le.debug_wb_data = data;
            self.stats.forwards += 1;

            let exec = ExecResponse { uop: le.uop, data };
            match dst_type {
                DstType::Float => out.fresp[lane] = Some(exec),
                DstType::Int => out.iresp[lane] = Some(exec),
                DstType::None => {}
            }
            if self.trace {
                eprintln!(
                    "WB  ld[{}] forwarded {:#x} from st[{}]",
                    wf.ldq_idx, data, wf.stq_idx
                );
            }
        }
    }
}

/// Width/sign extension of raw cache data, with NaN-boxing for FP words.
fn extend_load(data: u64, width: MemWidth, signed: bool, dst: DstType) -> u64 {
    let v = match (width, signed) {
        (MemWidth::Byte, true) => data as u8 as i8 as i64 as u64,
        (MemWidth::Half, true) => data as u16 as i16 as i64 as u64,
        (MemWidth::Word, true) => data as u32 as i32 as i64 as u64,
        (MemWidth::Byte, false) => data as u8 as u64,
        (MemWidth::Half, false) => data as u16 as u64,
        (MemWidth::Word, false) => data as u32 as u64,
        (MemWidth::Double, _) => data,
    };
    extend_box(v, width, dst)
}

/// NaN-boxes single-precision values destined for the FP register file.
fn extend_box(data: u64, width: MemWidth, dst: DstType) -> u64 {
    if dst == DstType::Float && width == MemWidth::Word {
        data | 0xFFFF_FFFF_0000_0000
    } else {
        data
    }
}
