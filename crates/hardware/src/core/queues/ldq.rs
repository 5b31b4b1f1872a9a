//! Load Queue (LDQ) for in-flight loads.
//!
//! The LDQ is a circular buffer that tracks every load from dispatch through
//! commit. It provides:
//! 1. **Allocation:** Reserve a slot at dispatch, snapshotting the live-store set.
//! 2. **Execution State:** Track translation, issue, success, forwarding, and
//!    ordering-failure flags per entry.
//! 3. **Age Selection:** Oldest-first selection of retry and wakeup candidates.
//! 4. **Commit:** Dequeue from the head in program order.
//! 5. **Squash:** Tail retraction on branch misprediction, full reset on exception.

use crate::core::uop::MicroOp;

/// A single entry in the load queue.
#[derive(Clone, Debug, Default)]
pub struct LdqEntry {
    /// The dispatched micro-op.
    pub uop: MicroOp,
    /// Translated (or, on TLB miss, virtual) address.
    pub addr: Option<u64>,
    /// The held address is virtual; the load must re-translate before use.
    pub addr_is_virtual: bool,
    /// The address targets an uncacheable region.
    pub addr_is_uncacheable: bool,
    /// A cache request has been issued and not cancelled.
    pub executed: bool,
    /// The next response for this load must be dropped and the load re-issued.
    pub execute_ignore: bool,
    /// Data has been delivered to the core.
    pub succeeded: bool,
    /// The load read stale data; the core must replay it.
    pub order_fail: bool,
    /// The load's cache block became externally visible while in flight.
    pub observed: bool,
    /// Bit per STQ slot holding a store older than this load.
    pub st_dep_mask: u64,
    /// STQ allocation cursor at dispatch; exclusive upper bound for forwarding.
    pub youngest_stq_idx: usize,
    /// Data was forwarded from the store queue.
    pub forward_std_val: bool,
    /// STQ slot the data was forwarded from.
    pub forward_stq_idx: usize,
    /// Last data value written back, kept for inspection.
    pub debug_wb_data: u64,
    /// Whether this slot is occupied.
    pub valid: bool,
}

/// Load queue — circular buffer of in-flight loads.
pub struct LoadQueue {
    entries: Vec<LdqEntry>,
    /// Index of the oldest entry (commit point).
    head: usize,
    /// Index where the next entry will be allocated.
    tail: usize,
    /// Number of valid entries.
    count: usize,
}

impl LoadQueue {
    /// Creates a new load queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, LdqEntry::default);
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

    /// Allocates a slot for a dispatched load. Returns the slot index, or
    /// `None` if the queue is full.
    ///
    /// The slot must not still be valid; re-allocating a live slot is a
    /// design error upstream.
    pub fn allocate(&mut self, uop: MicroOp, st_dep_mask: u64, youngest_stq_idx: usize) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let idx = self.tail;
        debug_assert!(!self.entries[idx].valid, "LDQ slot {} reallocated while valid", idx);

        self.entries[idx] = LdqEntry {
            uop,
            st_dep_mask,
            youngest_stq_idx,
            valid: true,
            ..Default::default()
        };

        self.tail = self.wrap_inc(self.tail);
        self.count += 1;
        Some(idx)
    }

    /// Returns the entry at `idx` if it is occupied.
    pub fn get(&self, idx: usize) -> Option<&LdqEntry> {
        let e = &self.entries[idx];
        if e.valid { Some(e) } else { None }
    }

    /// Returns the occupied entry at `idx` mutably.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut LdqEntry> {
        let e = &mut self.entries[idx];
        if e.valid { Some(e) } else { None }
    }

    /// Dequeues the head entry at commit. Returns the retired entry.
    pub fn dequeue_head(&mut self) -> Option<LdqEntry> {
        if self.count == 0 || !self.entries[self.head].valid {
            return None;
        }
        let entry = std::mem::take(&mut self.entries[self.head]);
        self.head = self.wrap_inc(self.head);
        self.count -= 1;
        Some(entry)
    }

    /// Retracts the tail to `new_tail`, invalidating everything younger.
    ///
    /// Used on branch misprediction with the tail snapshotted at the branch.
    pub fn retract_tail_to(&mut self, new_tail: usize) {
        let mut idx = new_tail;
        while idx != self.tail {
            if self.entries[idx].valid {
                self.entries[idx] = LdqEntry::default();
                self.count -= 1;
            }
            idx = self.wrap_inc(idx);
        }
        self.tail = new_tail;
    }

    /// Flushes all entries and resets head and tail to zero.
    pub fn flush_all(&mut self) {
        for entry in &mut self.entries {
            *entry = LdqEntry::default();
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Age-priority selection: returns the oldest occupied slot satisfying
    /// `pred`, scanning circularly from the head.
    pub fn oldest_where(&self, mut pred: impl FnMut(usize, &LdqEntry) -> bool) -> Option<usize> {
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
    pub fn for_each_valid(&mut self, mut f: impl FnMut(usize, &mut LdqEntry)) {
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid {
                f(idx, &mut self.entries[idx]);
            }
            idx = self.wrap_inc(idx);
        }
    }
}
