//! Store-to-load forwarding: age selection and data extraction.
//!
//! When the search engine finds stores whose bytes overlap an executing
//! load, the *youngest store still older than the load* is the only legal
//! source. If that store fully covers the load's bytes, its data is spliced
//! into the load's writeback; any other overlap blocks the load until the
//! store drains.

use crate::common::mask::youngest_older_match;
use crate::core::uop::MemWidth;

/// A forwarding decision latched for next cycle's writeback.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WbForward {
    /// The load being satisfied.
    pub ldq_idx: usize,
    /// The store supplying the data.
    pub stq_idx: usize,
}

/// Outcome of the forwarding age select for one searching load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ForwardSel {
    /// No overlapping older store.
    None,
    /// The youngest older match fully covers the load: forward from it.
    Forward(usize),
    /// The youngest older match only partially covers the load (or cannot
    /// supply data): the load must wait for it to drain.
    Block(usize),
}

/// Runs the age select over the match vectors.
///
/// `addr_matches` holds every older store touching the load's bytes;
/// `fwd_matches` the subset that fully covers them. `youngest_stq_idx` is
/// the exclusive age limit snapshotted at the load's dispatch. The doubled
/// match vector is scanned for its last set bit below the limit, so the
/// youngest older store wins.
pub(crate) fn select_forward(
    addr_matches: u64,
    fwd_matches: u64,
    youngest_stq_idx: usize,
    stq_capacity: usize,
) -> ForwardSel {
    match youngest_older_match(addr_matches, youngest_stq_idx, stq_capacity) {
        None => ForwardSel::None,
        Some(idx) if fwd_matches & (1u64 << idx) != 0 => ForwardSel::Forward(idx),
        Some(idx) => ForwardSel::Block(idx),
    }
}

/// Splices forwarded store data into a load result.
///
/// The store's register value is positioned at its own byte offset within
/// the double-word; the load re-extracts at its offset and width, then
/// sign- or zero-extends. Mirrors a store-generator feeding a load-generator
/// in the writeback datapath.
pub(crate) fn forward_data(
    store_data: u64,
    store_addr: u64,
    load_addr: u64,
    load_width: MemWidth,
    signed: bool,
) -> u64 {
    debug_assert!(load_addr >= store_addr);
    let offset = (load_addr - store_addr) as u32;
    let shifted = store_data >> (offset * 8);
    match (load_width, signed) {
        (MemWidth::Byte, true) => shifted as u8 as i8 as i64 as u64,
        (MemWidth::Half, true) => shifted as u16 as i16 as i64 as u64,
        (MemWidth::Word, true) => shifted as u32 as i32 as i64 as u64,
        (MemWidth::Byte, false) => shifted as u8 as u64,
        (MemWidth::Half, false) => shifted as u16 as u64,
        (MemWidth::Word, false) => shifted as u32 as u64,
        (MemWidth::Double, _) => shifted,
    }
}
