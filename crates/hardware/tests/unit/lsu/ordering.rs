//! Memory-ordering search scenarios.
//!
//! A store whose address resolves after a dependent load already completed
//! flags an ordering failure on that load; a load still in flight drops its
//! response instead. Load-load order is enforced against observed blocks.

use crate::common::bench;
use lsu_core::common::error::MemException;
use lsu_core::core::uop::MemWidth;

#[test]
fn late_store_address_fails_completed_load() {
    let mut tb = bench();

    // Store dispatched first (older), address unknown.
    let s = tb.store_split(MemWidth::Word);
    // Younger load to the same address executes speculatively.
    let l = tb.load(0x3000, MemWidth::Word);
    assert!(
        tb.run_until(10, |o| o.iresp.iter().flatten().count() > 0),
        "speculative load must complete"
    );

    // The block becomes externally visible.
    tb.dcache.push_release(0x3000);
    tb.step_n(3);
    assert!(
        tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap().observed,
        "release search must mark the load observed"
    );

    // Now the store's address arrives and matches.
    tb.send_agu(s.uop, Some(0x3000), Some(0x77));
    let mut reported = None;
    for _ in 0..5 {
        tb.step();
        if let Some(x) = tb.last.lxcpt {
            reported = Some(x);
            break;
        }
    }

    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(e.order_fail, "completed load must be flagged");
    let x = reported.expect("ordering failure must reach the ROB");
    assert_eq!(x.rob_idx, l.uop.rob_idx);
    assert!(matches!(x.cause, MemException::MemOrdering(0x3000)));
    assert_eq!(tb.lsu.stats.order_fails, 1);

    // The core answers with an exception; everything speculative dies.
    tb.raise_exception();
    tb.step();
    assert!(tb.lsu.ldq.is_empty());
}

#[test]
fn late_store_address_drops_inflight_load_response() {
    // Two-cycle cache latency keeps the load's response in flight when the
    // store address shows up.
    let mut config = crate::common::test_config();
    config.dcache.latency = 2;
    let mut tb = lsu_core::sim::TestBench::new(&config);

    let s = tb.store_split(MemWidth::Word);
    tb.dcache.poke(0x3100, 0x0BAD);

    let l = tb.load(0x3100, MemWidth::Word);
    // The store's address lands one cycle behind the load's (one AGU lane).
    tb.send_agu(s.uop, Some(0x3100), Some(0x66));

    tb.step(); // load issues to the cache
    tb.step(); // store address arrives; the search flags the in-flight load
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(
        e.execute_ignore || !e.executed,
        "in-flight load must be told to drop its response"
    );
    assert!(!e.order_fail, "in-flight load is replayed, not failed");

    // The dropped response never completes the load with stale data;
    // the replay forwards the store's data instead.
    assert!(
        tb.run_until(40, |o| o.iresp.iter().flatten().any(|r| r.data == 0x66)),
        "replayed load must see the store's data"
    );
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert_ne!(e.debug_wb_data, 0x0BAD, "stale memory data must not land");
    assert_eq!(tb.lsu.stats.order_fails, 0);
}

#[test]
fn younger_load_killed_behind_unexecuted_older_load() {
    let mut tb = bench();
    tb.dcache.poke(0x4000, 0x5151);
    // The older load's first access is nacked, parking it unexecuted.
    tb.dcache.script_nack(0x4000, 1);

    let l0 = tb.load(0x4000, MemWidth::Word);
    let l1 = tb.load(0x4000, MemWidth::Word);

    // Both loads must still complete, and in the end neither carries an
    // ordering failure: the younger one was killed and replayed.
    for _ in 0..40 {
        tb.step();
        let done = [l0, l1].iter().all(|h| {
            tb.lsu
                .ldq
                .get(h.ldq_idx().unwrap())
                .unwrap()
                .succeeded
        });
        if done {
            break;
        }
    }
    let e0 = tb.lsu.ldq.get(l0.ldq_idx().unwrap()).unwrap();
    let e1 = tb.lsu.ldq.get(l1.ldq_idx().unwrap()).unwrap();
    assert!(e0.succeeded && e1.succeeded);
    assert!(!e0.order_fail && !e1.order_fail);
    assert_eq!(e0.debug_wb_data, 0x5151);
    assert_eq!(e1.debug_wb_data, 0x5151);
    assert!(tb.lsu.stats.nacks >= 1);
}

#[test]
fn observed_younger_load_fails_when_older_executes() {
    let mut tb = bench();
    tb.dcache.poke(0x5000, 0x99);
    // Park the older load on a TLB miss so the younger one runs first.
    tb.dtlb.script_miss(0x5000, 1);

    let l0 = tb.load(0x5000, MemWidth::Word);
    let l1 = tb.load(0x5000, MemWidth::Word);

    // Wait for the younger load to complete while the older is parked.
    for _ in 0..10 {
        tb.step();
        if tb
            .lsu
            .ldq
            .get(l1.ldq_idx().unwrap())
            .is_some_and(|e| e.succeeded)
        {
            break;
        }
    }
    assert!(tb.lsu.ldq.get(l1.ldq_idx().unwrap()).unwrap().succeeded);
    assert!(!tb.lsu.ldq.get(l0.ldq_idx().unwrap()).unwrap().succeeded);

    // The line is observed, then the older load retries and searches.
    tb.dcache.push_release(0x5000);
    let mut reported = None;
    for _ in 0..20 {
        tb.step();
        if let Some(x) = tb.last.lxcpt {
            reported = Some(x);
            break;
        }
    }

    let e1 = tb.lsu.ldq.get(l1.ldq_idx().unwrap()).unwrap();
    assert!(e1.order_fail, "observed younger load must be failed");
    let x = reported.expect("load-load ordering failure must be reported");
    assert_eq!(x.rob_idx, l1.uop.rob_idx);
    assert!(matches!(x.cause, MemException::MemOrdering(_)));
}

#[test]
fn dependence_masks_track_live_stores() {
    let mut tb = bench();

    let s0 = tb.store(0x6000, 1, MemWidth::Double);
    let s1 = tb.store(0x6008, 2, MemWidth::Double);
    let l = tb.load(0x6010, MemWidth::Double);

    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    let expect = (1u64 << s0.stq_idx().unwrap()) | (1u64 << s1.stq_idx().unwrap());
    assert_eq!(e.st_dep_mask, expect, "load must depend on both older stores");
    assert_eq!(tb.lsu.live_store_mask(), expect);

    // Draining a store releases its dependence bit everywhere.
    tb.commit(&s0);
    tb.step_n(12);
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert_eq!(e.st_dep_mask, 1u64 << s1.stq_idx().unwrap());
    assert_eq!(tb.lsu.live_store_mask(), 1u64 << s1.stq_idx().unwrap());
}
