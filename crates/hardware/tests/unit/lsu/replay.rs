//! Local recovery paths: TLB-miss retry, nack wakeup, uncacheable gating,
//! and the speculative-wakeup handshake.

use crate::common::{bench, test_config};
use lsu_core::core::uop::MemWidth;
use lsu_core::sim::TestBench;

#[test]
fn tlb_miss_parks_then_retries() {
    let mut tb = bench();
    tb.dcache.poke(0x9000, 0x1234);
    tb.dtlb.script_miss(0x9000, 1);

    let l = tb.load(0x9000, MemWidth::Word);
    tb.step_n(2);
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(e.addr_is_virtual, "missed translation parks the load");
    assert!(!e.executed);

    assert!(
        tb.run_until(20, |o| o.iresp.iter().flatten().any(|r| r.data == 0x1234)),
        "retry must eventually translate and complete"
    );
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(!e.addr_is_virtual && e.succeeded);
    assert!(tb.lsu.stats.tlb_retries >= 1);
}

#[test]
fn store_tlb_miss_retries_from_commit_head() {
    let mut tb = bench();
    tb.dtlb.script_miss(0xA000, 1);

    let s = tb.store(0xA000, 0x42, MemWidth::Double);
    tb.step_n(2);
    assert!(
        tb.lsu
            .stq
            .get(s.stq_idx().unwrap())
            .unwrap()
            .addr_is_virtual
    );

    // The retry re-translates; the store then commits and drains.
    tb.commit(&s);
    tb.step_n(24);
    assert_eq!(tb.dcache.peek(0xA000), 0x42);
    assert!(tb.lsu.stq.is_empty());
    assert!(tb.lsu.stats.tlb_retries >= 1);
}

#[test]
fn nacked_load_wakes_up_and_replays() {
    let mut tb = bench();
    tb.dcache.poke(0xB000, 0x77);
    tb.dcache.script_nack(0xB000, 1);

    let l = tb.load(0xB000, MemWidth::Word);
    assert!(
        tb.run_until(30, |o| o.iresp.iter().flatten().any(|r| r.data == 0x77)),
        "nacked load must replay and complete"
    );
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(e.succeeded && e.executed);
    assert!(tb.lsu.stats.nacks >= 1, "the nack must be counted");
    assert!(tb.lsu.stats.load_wakeups >= 1, "the replay uses the wakeup path");
}

#[test]
fn replay_is_idempotent_for_memory_state() {
    let mut tb = bench();
    tb.dcache.poke(0xB100, 0xFEED);
    tb.dcache.script_nack(0xB100, 2);

    let l = tb.load(0xB100, MemWidth::Double);
    assert!(tb.run_until(40, |o| o.iresp.iter().flatten().any(|r| r.data == 0xFEED)));
    // Replays never disturbed the memory image.
    assert_eq!(tb.dcache.peek(0xB100), 0xFEED);
    assert_eq!(
        tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap().debug_wb_data,
        0xFEED
    );
}

#[test]
fn nacked_store_rewinds_and_redrains() {
    let mut tb = bench();
    tb.dcache.script_nack(0xC000, 1);

    let s = tb.store(0xC000, 0x99, MemWidth::Double);
    tb.commit(&s);
    tb.step_n(30);
    assert_eq!(tb.dcache.peek(0xC000), 0x99, "store must drain after the nack");
    assert!(tb.lsu.stq.is_empty());
}

#[test]
fn uncacheable_load_waits_for_rob_head() {
    let mut tb = bench();
    tb.dcache.poke(0xD000, 0x3C);
    tb.dtlb.mark_uncacheable(0xD000);

    let l = tb.load(0xD000, MemWidth::Word);
    tb.step_n(10);
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(
        !e.succeeded && !e.executed,
        "an uncacheable load must not issue speculatively"
    );
    assert!(e.addr_is_uncacheable);

    // Once the load sits at the ROB head, the wakeup path releases it.
    tb.set_load_at_rob_head(true);
    assert!(
        tb.run_until(20, |o| o.iresp.iter().flatten().any(|r| r.data == 0x3C)),
        "uncacheable load must issue at the ROB head"
    );
}

#[test]
fn fence_drains_behind_older_stores() {
    let mut tb = bench();

    let s = tb.store(0xF000, 1, MemWidth::Double);
    let f = tb.fence();
    tb.commit(&s);
    tb.commit(&f);
    tb.request_fence_drain();

    let mut drained = false;
    for _ in 0..30 {
        tb.step();
        if tb.lsu.stq.is_empty() && tb.dcache.peek(0xF000) == 1 {
            drained = true;
            break;
        }
    }
    assert!(drained, "store then fence must both leave the queue");
    assert!(tb.last.fencei_rdy, "an empty store queue unblocks FENCE.I");
}

#[test]
fn speculative_wakeup_confirms_on_time() {
    // One-cycle cache: the wakeup is followed by data in the next cycle.
    let mut tb = bench();
    tb.dcache.poke(0xE000, 1);

    tb.load(0xE000, MemWidth::Word);
    let mut saw_wakeup = false;
    let mut saw_miss = false;
    for _ in 0..8 {
        tb.step();
        saw_wakeup |= tb.last.spec_ld_wakeup.is_some();
        saw_miss |= tb.last.ld_miss;
    }
    assert!(saw_wakeup, "an integer load must raise the speculative wakeup");
    assert!(!saw_miss, "data arrived on time; no miss strobe");
}

#[test]
fn speculative_wakeup_misses_on_slow_cache() {
    let mut config = test_config();
    config.dcache.latency = 2;
    let mut tb = TestBench::new(&config);
    tb.dcache.poke(0xE100, 2);

    tb.load(0xE100, MemWidth::Word);
    let mut saw_miss = false;
    for _ in 0..8 {
        tb.step();
        saw_miss |= tb.last.ld_miss;
    }
    assert!(saw_miss, "late data must raise the load-miss strobe");
}
