//! Bounds-Descriptor Queue (BDQ) for descriptor store/clear/search ops.
//!
//! Allocation-like instructions (bounds store, clear, search) occupy the BDQ.
//! Each entry first probes the HBT for a usable slot (occupancy check), then,
//! once the op commits, writes its descriptor into that slot. Clears and
//! searches ride the same machinery with different payloads; the retiring
//! op's code selects which counter CSR is bumped.

use crate::core::uop::{MemCmd, MicroOp};

/// Lifecycle state of a BDQ entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BdqState {
    /// Allocated; waiting for the pointer value from address generation.
    #[default]
    Init,

    /// Probing the HBT for a free (or matching) slot.
    OccChk,

    /// Slot found; waiting for commit, then writing the descriptor.
    BndStr,

    /// No usable slot in any way; an occupancy exception is pending.
    Fail,

    /// Descriptor written; the entry may retire once committed.
    Done,
}

/// Outcome of an occupancy-probe response against an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OccOutcome {
    /// Slot usable; the entry moves to the store phase.
    SlotFound,
    /// Slot unusable; the next way will be probed.
    Retry,
    /// No ways left.
    Fail,
}

/// A single entry in the bounds-descriptor queue.
#[derive(Clone, Debug, Default)]
pub struct BdqEntry {
    /// The micro-op; its command flips from read to write at `SlotFound`.
    pub uop: MicroOp,
    /// Tagged pointer value (PAC in the upper bits).
    pub addr: Option<u64>,
    /// Descriptor payload for the bounds store.
    pub data: Option<u64>,
    /// A probe or store is in flight and not cancelled.
    pub executed: bool,
    /// The ROB has committed the op.
    pub committed: bool,
    /// The pointer carried a PAC signature.
    pub signed: bool,
    /// Way currently targeted; selects the HBT slot address for both the
    /// occupancy probe and the descriptor store.
    pub way: u32,
    /// Failed probes so far; bounds the retry sequence.
    pub count: u32,
    /// Current lifecycle state.
    pub state: BdqState,
    /// Whether this slot is occupied.
    pub valid: bool,
}

impl BdqEntry {
    /// Address-generation delivery: records the pointer and starts the
    /// occupancy check.
    pub fn deliver_addr(&mut self, addr: u64, data: Option<u64>) {
        if self.state == BdqState::Init {
            self.addr = Some(addr);
            if data.is_some() {
                self.data = data;
            }
            self.state = BdqState::OccChk;
        }
    }

    /// Applies an occupancy-probe response. `usable` is the pluggable
    /// `occ_check` verdict; `num_way` bounds the retry sequence.
    pub fn occ_response(&mut self, usable: bool, num_way: u32) -> OccOutcome {
        debug_assert_eq!(self.state, BdqState::OccChk);
        if usable {
            self.uop.mem_cmd = MemCmd::Write;
            self.state = BdqState::BndStr;
            self.executed = false;
            OccOutcome::SlotFound
        } else if self.count < num_way.saturating_sub(1) {
            self.count += 1;
            self.way = self.count;
            self.executed = false;
            OccOutcome::Retry
        } else {
            self.state = BdqState::Fail;
            OccOutcome::Fail
        }
    }

    /// Applies the descriptor-store response.
    pub fn store_response(&mut self) {
        debug_assert_eq!(self.state, BdqState::BndStr);
        self.state = BdqState::Done;
    }
}

/// Bounds-descriptor queue — circular buffer of descriptor ops in flight.
pub struct BoundsDescQueue {
    entries: Vec<BdqEntry>,
    head: usize,
    tail: usize,
    count: usize,
}

impl BoundsDescQueue {
    /// Creates a new bounds-descriptor queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, BdqEntry::default);
        Self {
            entries,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Returns the capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of occupied entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if the queue is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.entries.len()
    }

    /// Index of the oldest entry.
    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    /// Index where the next entry will be allocated.
    #[inline]
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Successor of an index, wrapped.
    #[inline]
    pub fn wrap_inc(&self, idx: usize) -> usize {
        (idx + 1) % self.entries.len()
    }

    /// Allocates a slot for a dispatched descriptor op.
    pub fn allocate(&mut self, uop: MicroOp, signed: bool) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let idx = self.tail;
        debug_assert!(!self.entries[idx].valid, "BDQ slot {} reallocated while valid", idx);

        self.entries[idx] = BdqEntry {
            uop,
            signed,
            valid: true,
            ..Default::default()
        };

        self.tail = self.wrap_inc(self.tail);
        self.count += 1;
        Some(idx)
    }

    /// Returns the entry at `idx` if it is occupied.
    pub fn get(&self, idx: usize) -> Option<&BdqEntry> {
        let e = &self.entries[idx];
        if e.valid { Some(e) } else { None }
    }

    /// Returns the occupied entry at `idx` mutably.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut BdqEntry> {
        let e = &mut self.entries[idx];
        if e.valid { Some(e) } else { None }
    }

    /// Dequeues the head entry if it is committed and written.
    pub fn dequeue_ready(&mut self) -> Option<BdqEntry> {
        if self.count == 0 {
            return None;
        }
        let e = &self.entries[self.head];
        if !(e.valid && e.committed && e.state == BdqState::Done) {
            return None;
        }
        let entry = std::mem::take(&mut self.entries[self.head]);
        self.head = self.wrap_inc(self.head);
        self.count -= 1;
        Some(entry)
    }

    /// Retracts the tail to `new_tail`, invalidating everything younger.
    pub fn retract_tail_to(&mut self, new_tail: usize) {
        let mut idx = new_tail;
        while idx != self.tail {
            if self.entries[idx].valid {
                self.entries[idx] = BdqEntry::default();
                self.count -= 1;
            }
            idx = self.wrap_inc(idx);
        }
        self.tail = new_tail;
    }

    /// Flushes all entries and resets head and tail to zero.
    pub fn flush_all(&mut self) {
        for entry in &mut self.entries {
            *entry = BdqEntry::default();
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Age-priority selection: the oldest occupied slot satisfying `pred`.
    pub fn oldest_where(&self, mut pred: impl FnMut(usize, &BdqEntry) -> bool) -> Option<usize> {
        let mut idx = self.head;
        for _ in 0..self.count {
            let e = &self.entries[idx];
            if e.valid && pred(idx, e) {
                return Some(idx);
            }
            idx = self.wrap_inc(idx);
        }
        None
    }

    /// Calls `f` on every occupied entry, oldest first.
    pub fn for_each_valid(&mut self, mut f: impl FnMut(usize, &mut BdqEntry)) {
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid {
                f(idx, &mut self.entries[idx]);
            }
            idx = self.wrap_inc(idx);
        }
    }
}
