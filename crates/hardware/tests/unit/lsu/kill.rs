//! Branch-mispredict squash and exception recovery.

use crate::common::bench;
use lsu_core::core::uop::MemWidth;

#[test]
fn mispredict_restores_tails_and_kills_younger_ops() {
    let mut tb = bench();

    let l0 = tb.load(0x6000, MemWidth::Word);
    let branch = tb.open_branch();
    let l1 = tb.load(0x6008, MemWidth::Word);
    let l2 = tb.load(0x6010, MemWidth::Word);

    assert_eq!(tb.lsu.ldq.len(), 3);
    tb.resolve_branch(branch, true);
    tb.step();

    assert!(tb.lsu.ldq.get(l0.ldq_idx().unwrap()).is_some());
    assert!(tb.lsu.ldq.get(l1.ldq_idx().unwrap()).is_none());
    assert!(tb.lsu.ldq.get(l2.ldq_idx().unwrap()).is_none());
    assert_eq!(tb.lsu.ldq.tail(), l1.ldq_idx().unwrap());
    // Shadow checks die with their loads.
    assert!(tb.lsu.mcq.get(l1.mcq_idx().unwrap()).is_none());
    assert!(tb.lsu.mcq.get(l2.mcq_idx().unwrap()).is_none());
    assert!(tb.lsu.mcq.get(l0.mcq_idx().unwrap()).is_some());

    // The freed slots are immediately reusable.
    let l3 = tb.load(0x6018, MemWidth::Word);
    assert_eq!(l3.ldq_idx().unwrap(), l1.ldq_idx().unwrap());
}

#[test]
fn correct_prediction_only_clears_the_mask_bit() {
    let mut tb = bench();

    let branch = tb.open_branch();
    let l = tb.load(0x6100, MemWidth::Word);
    assert_ne!(
        tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap().uop.br_mask,
        0
    );

    tb.resolve_branch(branch, false);
    tb.step();
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert_eq!(e.uop.br_mask, 0, "resolved bit must clear");
    assert_eq!(tb.lsu.ldq.len(), 1, "correct prediction kills nothing");
}

#[test]
fn mispredict_kills_speculative_stores_but_spares_older_ones() {
    let mut tb = bench();

    let s0 = tb.store(0x7000, 1, MemWidth::Double);
    let branch = tb.open_branch();
    let s1 = tb.store(0x7008, 2, MemWidth::Double);

    tb.resolve_branch(branch, true);
    tb.step();

    assert!(tb.lsu.stq.get(s0.stq_idx().unwrap()).is_some());
    assert!(tb.lsu.stq.get(s1.stq_idx().unwrap()).is_none());
    assert_eq!(
        tb.lsu.live_store_mask(),
        1u64 << s0.stq_idx().unwrap(),
        "the live-store set must shrink with the kill"
    );

    // The surviving store still drains normally.
    tb.commit(&s0);
    tb.step_n(16);
    assert_eq!(tb.dcache.peek(0x7000), 1);
    assert!(tb.lsu.stq.is_empty());
}

#[test]
fn exception_keeps_committed_stores_until_drained() {
    let mut tb = bench();
    // Hold the drain off so the committed store is still queued when the
    // exception hits.
    tb.dcache.script_refusals(6);

    let s = tb.store(0x8000, 0x5A, MemWidth::Double);
    tb.commit(&s);
    tb.step_n(3);
    let spec = tb.load(0x8008, MemWidth::Double);

    tb.raise_exception();
    tb.step();

    assert!(tb.lsu.ldq.is_empty(), "speculative loads die on exception");
    assert!(
        tb.lsu.stq.get(s.stq_idx().unwrap()).is_some(),
        "a committed store survives the squash"
    );
    assert!(spec.ldq_idx().is_some());

    // It still reaches memory afterwards.
    tb.step_n(20);
    assert_eq!(tb.dcache.peek(0x8000), 0x5A);
    assert!(tb.lsu.stq.is_empty());
}

#[test]
fn exception_resets_bounds_queues() {
    let mut tb = bench();

    let _l = tb.load_tagged(0x0000_2000_0000_2000, MemWidth::Double, false);
    let _b = tb.bounds_op(lsu_core::core::uop::UopCode::BndStr, 0x0000_2000_0000_2000, 1);
    assert!(!tb.lsu.mcq.is_empty());
    assert!(!tb.lsu.bdq.is_empty());

    tb.raise_exception();
    tb.step();
    assert!(tb.lsu.mcq.is_empty());
    assert!(tb.lsu.bdq.is_empty());
}
