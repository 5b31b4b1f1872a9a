//! Store Queue (STQ) for speculative, committed, and draining stores.
//!
//! The STQ is a circular buffer with three cursors:
//! 1. **`head`** — oldest store still holding a slot; dequeues once the
//!    store has drained to memory (or a fence has been ordered).
//! 2. **`commit_head`** — oldest store the ROB has not yet committed;
//!    advances through committed slots.
//! 3. **`execute_head`** — next store to be issued to the cache; advances on
//!    an accepted request and rewinds on a nack.
//!
//! Entries are killed by branch misprediction only while speculative; a
//! committed entry being killed is a fatal invariant violation.

use crate::core::uop::MicroOp;

/// A single entry in the store queue.
#[derive(Clone, Debug, Default)]
pub struct StqEntry {
    /// The dispatched micro-op.
    pub uop: MicroOp,
    /// Translated (or, on TLB miss, virtual) address.
    pub addr: Option<u64>,
    /// The held address is virtual; the store must re-translate before draining.
    pub addr_is_virtual: bool,
    /// Store data, once delivered by the register-read/AGU path.
    pub data: Option<u64>,
    /// The execute cursor has issued this store to the cache; cleared when
    /// a nack rewinds past it.
    pub issued: bool,
    /// The ROB has committed this store.
    pub committed: bool,
    /// The store (or fence ordering) has completed in memory.
    pub succeeded: bool,
    /// Whether this slot is occupied.
    pub valid: bool,
}

/// Store queue — circular buffer with commit and execute cursors.
pub struct StoreQueue {
    entries: Vec<StqEntry>,
    head: usize,
    tail: usize,
    commit_head: usize,
    execute_head: usize,
    /// Number of valid entries.
    count: usize,
}

impl StoreQueue {
    /// Creates a new store queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, StqEntry::default);
        Self {
            entries,
            head: 0,
            tail: 0,
            commit_head: 0,
            execute_head: 0,
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

    /// Oldest not-yet-committed slot.
    #[inline]
    pub fn commit_head(&self) -> usize {
        self.commit_head
    }

    /// Next slot to issue to the cache.
    #[inline]
    pub fn execute_head(&self) -> usize {
        self.execute_head
    }

    /// Successor of an index, wrapped.
    #[inline]
    pub fn wrap_inc(&self, idx: usize) -> usize {
        (idx + 1) % self.entries.len()
    }

    /// Allocates a slot for a dispatched store. Returns the slot index, or
    /// `None` if the queue is full.
    pub fn allocate(&mut self, uop: MicroOp) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let idx = self.tail;
        debug_assert!(!self.entries[idx].valid, "STQ slot {} reallocated while valid", idx);

        self.entries[idx] = StqEntry {
            uop,
            valid: true,
            ..Default::default()
        };

        self.tail = self.wrap_inc(self.tail);
        self.count += 1;
        Some(idx)
    }

    /// Returns the entry at `idx` if it is occupied.
    pub fn get(&self, idx: usize) -> Option<&StqEntry> {
        let e = &self.entries[idx];
        if e.valid { Some(e) } else { None }
    }

    /// Returns the occupied entry at `idx` mutably.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut StqEntry> {
        let e = &mut self.entries[idx];
        if e.valid { Some(e) } else { None }
    }

    /// Advances `commit_head` through committed slots.
    pub fn advance_commit_head(&mut self) {
        while self.commit_head != self.tail {
            let e = &self.entries[self.commit_head];
            if e.valid && !e.committed {
                break;
            }
            self.commit_head = self.wrap_inc(self.commit_head);
        }
    }

    /// Advances `execute_head` past an accepted request.
    pub fn advance_execute_head(&mut self) {
        self.execute_head = self.wrap_inc(self.execute_head);
    }

    /// Rewinds `execute_head` to a nacked slot, if that slot is older than
    /// the current cursor. Everything the rewind passes over will be issued
    /// again.
    pub fn rewind_execute_head(&mut self, idx: usize) {
        // Wrapped compare against head: rewind only to an older position.
        let age = |i: usize| (i + self.capacity() - self.head) % self.capacity();
        if self.execute_head != idx && age(idx) >= age(self.execute_head) {
            return;
        }
        let mut i = idx;
        while i != self.execute_head {
            self.entries[i].issued = false;
            i = self.wrap_inc(i);
        }
        self.entries[idx].issued = false;
        self.execute_head = idx;
    }

    /// Dequeues the head entry once drained. The caller is responsible for
    /// clearing dependence masks that referenced this slot.
    pub fn dequeue_head(&mut self) -> Option<StqEntry> {
        if self.count == 0 || !self.entries[self.head].valid {
            return None;
        }
        let idx = self.head;
        let entry = std::mem::take(&mut self.entries[idx]);
        self.head = self.wrap_inc(self.head);
        self.count -= 1;
        // Cursors never trail the head.
        if idx == self.commit_head {
            self.commit_head = self.head;
        }
        if idx == self.execute_head {
            self.execute_head = self.head;
        }
        Some(entry)
    }

    /// Retracts the tail to `new_tail`, invalidating everything younger.
    ///
    /// Panics in debug builds if a committed entry would be killed; the
    /// commit point never sits beyond a mispredicted branch.
    pub fn retract_tail_to(&mut self, new_tail: usize) {
        let mut idx = new_tail;
        while idx != self.tail {
            if self.entries[idx].valid {
                debug_assert!(
                    !self.entries[idx].committed,
                    "committed STQ entry {} killed by branch",
                    idx
                );
                self.entries[idx] = StqEntry::default();
                self.count -= 1;
            }
            idx = self.wrap_inc(idx);
        }
        self.tail = new_tail;
        self.clamp_cursors();
    }

    /// Exception squash: drops every speculative (non-committed) store,
    /// keeping committed entries that still need to drain.
    pub fn flush_speculative(&mut self) {
        let mut idx = self.commit_head;
        while idx != self.tail {
            if self.entries[idx].valid {
                self.entries[idx] = StqEntry::default();
                self.count -= 1;
            }
            idx = self.wrap_inc(idx);
        }
        self.tail = self.commit_head;
        self.clamp_cursors();
    }

    /// Age-priority selection: returns the oldest occupied slot at or after
    /// `from` (toward the tail) satisfying `pred`.
    pub fn oldest_where_from(
        &self,
        from: usize,
        mut pred: impl FnMut(usize, &StqEntry) -> bool,
    ) -> Option<usize> {
        let cap = self.capacity();
        // Wrapped span from `from` to the tail; a full queue with the two
        // cursors equal covers every slot.
        let span = if self.count == cap && from == self.tail {
            cap
        } else {
            (self.tail + cap - from) % cap
        };
        let mut idx = from;
        for _ in 0..span {
            let e = &self.entries[idx];
            if e.valid && pred(idx, e) {
                return Some(idx);
            }
            idx = self.wrap_inc(idx);
        }
        None
    }

    /// Calls `f` on every occupied entry, oldest first.
    pub fn for_each_valid(&mut self, mut f: impl FnMut(usize, &mut StqEntry)) {
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid {
                f(idx, &mut self.entries[idx]);
            }
            idx = self.wrap_inc(idx);
        }
    }

    /// Pulls the execute and commit cursors back into `[head, tail]`.
    fn clamp_cursors(&mut self) {
        let cap = self.capacity();
        let age = |i: usize| (i + cap - self.head) % cap;
        let tail_age = if self.count == cap { cap } else { age(self.tail) };
        if age(self.commit_head) > tail_age {
            self.commit_head = self.tail;
        }
        if age(self.execute_head) > tail_age {
            self.execute_head = self.tail;
        }
    }
}
