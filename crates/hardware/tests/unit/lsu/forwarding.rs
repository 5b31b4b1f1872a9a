//! Store-to-load forwarding scenarios.
//!
//! A load whose bytes are fully covered by an older in-flight store takes
//! its data straight from the store queue; a partial overlap blocks the
//! load until the store drains to memory.

use crate::common::bench;
use lsu_core::core::uop::MemWidth;

#[test]
fn pure_forward_delivers_store_data() {
    let mut tb = bench();

    let s = tb.store(0x1000, 0xDEAD, MemWidth::Word);
    let l = tb.load(0x1000, MemWidth::Word);

    assert!(
        tb.run_until(10, |o| o.iresp.iter().flatten().any(|r| r.data == 0xDEAD)),
        "load never received forwarded data"
    );

    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(e.succeeded, "forwarded load must be succeeded");
    assert!(e.forward_std_val, "data must come from the store queue");
    assert_eq!(e.forward_stq_idx, s.stq_idx().unwrap());
    assert!(!e.order_fail);

    // Retire both; the store still drains to memory afterwards.
    tb.commit(&s);
    tb.commit(&l);
    tb.step_n(20);
    assert_eq!(tb.dcache.read(0x1000, MemWidth::Word), 0xDEAD);
    assert!(tb.lsu.stq.is_empty());
    assert!(tb.lsu.ldq.is_empty());
    assert_eq!(tb.lsu.stats.forwards, 1);
}

#[test]
fn forward_applies_sign_extension() {
    let mut tb = bench();

    let _s = tb.store(0x2000, 0x80, MemWidth::Byte);
    // Signed byte load of the stored byte.
    let template = tb.load(0x2000, MemWidth::Byte).uop;
    let h = tb.dispatch(lsu_core::core::uop::MicroOp {
        rob_idx: template.rob_idx + 1,
        signed_load: true,
        ..template
    });
    tb.send_agu(h.uop, Some(0x2000), None);

    let want = (u64::MAX << 8) | 0x80;
    assert!(
        tb.run_until(12, |o| o.iresp.iter().flatten().any(|r| r.data == want)),
        "signed forward must sign-extend 0x80"
    );
}

#[test]
fn partial_overlap_blocks_until_drain() {
    let mut tb = bench();
    tb.dcache.poke(0x3000, 0x2222_2222);

    let s = tb.store(0x3000, 0x11, MemWidth::Byte);
    let l = tb.load(0x3000, MemWidth::Word);

    // The load cannot forward a byte into a word read: it parks.
    tb.step_n(4);
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(!e.succeeded, "partial overlap must not forward");
    assert!(!e.executed, "cache access must have been killed");

    // Once the store commits and drains, the wakeup path re-issues the
    // load and it reads the merged word.
    tb.commit(&s);
    assert!(
        tb.run_until(40, |o| o
            .iresp
            .iter()
            .flatten()
            .any(|r| r.data == 0x2222_2211)),
        "load must wake up and read the merged word"
    );
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert!(e.succeeded && !e.forward_std_val);
    tb.commit(&l);
    tb.step_n(4);
    assert!(tb.lsu.ldq.is_empty());
}

#[test]
fn forward_picks_youngest_older_store() {
    let mut tb = bench();

    let s0 = tb.store(0x4000, 0xAAAA_AAAA, MemWidth::Word);
    let s1 = tb.store(0x4000, 0xBBBB_BBBB, MemWidth::Word);
    let l = tb.load(0x4000, MemWidth::Word);

    assert!(
        tb.run_until(12, |o| o.iresp.iter().flatten().any(|r| r.data == 0xBBBB_BBBB)),
        "the younger store's data must win"
    );
    let e = tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap();
    assert_eq!(e.forward_stq_idx, s1.stq_idx().unwrap());

    tb.commit(&s0);
    tb.commit(&s1);
    tb.commit(&l);
    tb.step_n(24);
    assert_eq!(tb.dcache.read(0x4000, MemWidth::Word), 0xBBBB_BBBB);
}

#[test]
fn store_data_arriving_late_still_forwards() {
    let mut tb = bench();

    // Address known, data not: the load must wait for the data delivery.
    let s = tb.store_split(MemWidth::Word);
    tb.send_agu(s.uop, Some(0x5000), None);
    let l = tb.load(0x5000, MemWidth::Word);
    tb.step_n(4);
    assert!(
        !tb.lsu.ldq.get(l.ldq_idx().unwrap()).unwrap().succeeded,
        "no data to forward yet"
    );

    // Deliver the store data; the load re-issues and forwards.
    tb.send_agu(s.uop, None, Some(0xCAFE));
    assert!(
        tb.run_until(30, |o| o.iresp.iter().flatten().any(|r| r.data == 0xCAFE)),
        "load must forward once the data shows up"
    );
}
