//! Structural invariants checked across a mixed stimulus run.

use crate::common::bench;
use lsu_core::sim::TestBench;
use lsu_core::core::uop::MemWidth;

/// The occupied LDQ slots are exactly the wrapped `[head, tail)` range.
fn check_ldq_range(tb: &TestBench) {
    let ldq = &tb.lsu.ldq;
    let cap = ldq.capacity();
    for i in 0..cap {
        let span = if ldq.len() == cap {
            cap
        } else {
            (ldq.tail() + cap - ldq.head()) % cap
        };
        let offset = (i + cap - ldq.head()) % cap;
        let in_range = offset < span;
        assert_eq!(
            ldq.get(i).is_some(),
            in_range,
            "LDQ slot {} validity disagrees with [head={}, tail={})",
            i,
            ldq.head(),
            ldq.tail()
        );
    }
}

/// Every completed load carries a data source; the live-store set matches
/// STQ occupancy; dependence masks only name live stores.
fn check_data_sources(tb: &TestBench) {
    for i in 0..tb.lsu.ldq.capacity() {
        if let Some(e) = tb.lsu.ldq.get(i) {
            if e.succeeded {
                assert!(
                    e.executed || e.forward_std_val,
                    "LDQ slot {} succeeded without a data source",
                    i
                );
            }
            assert_eq!(
                e.st_dep_mask & !tb.lsu.live_store_mask(),
                0,
                "LDQ slot {} depends on a dead store",
                i
            );
        }
    }

    let mut occupancy = 0u64;
    for k in 0..tb.lsu.stq.capacity() {
        if tb.lsu.stq.get(k).is_some() {
            occupancy |= 1u64 << k;
        }
    }
    assert_eq!(tb.lsu.live_store_mask(), occupancy);
}

#[test]
fn invariants_hold_across_mixed_traffic() {
    let mut tb = bench();

    for round in 0..12u64 {
        let addr = 0x2_0000 + (round % 4) * 8;
        let s = tb.store(addr, round, MemWidth::Double);
        let l = tb.load(addr, MemWidth::Double);
        tb.commit(&s);

        for _ in 0..12 {
            tb.step();
            check_ldq_range(&tb);
            check_data_sources(&tb);
            if tb
                .lsu
                .ldq
                .get(l.ldq_idx().unwrap())
                .is_some_and(|e| e.succeeded)
            {
                break;
            }
        }
        assert!(
            tb.lsu
                .ldq
                .get(l.ldq_idx().unwrap())
                .is_some_and(|e| e.succeeded),
            "round {}: load never completed",
            round
        );
        tb.commit(&l);
        for _ in 0..6 {
            tb.step();
            check_ldq_range(&tb);
            check_data_sources(&tb);
        }
    }

    // Let the last drains settle before counting retirements.
    for _ in 0..10 {
        tb.step();
        check_ldq_range(&tb);
        check_data_sources(&tb);
    }
    assert_eq!(tb.lsu.stats.num_mem_req, 24, "12 loads and 12 stores retired");
}
