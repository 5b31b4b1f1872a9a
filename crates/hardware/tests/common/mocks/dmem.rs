//! Mock DTLB and data-cache ports.
//!
//! The mockall mocks let a test script exact translation/port behavior per
//! call; `CountingDCache` is a hand-rolled port that accepts everything and
//! records per-cycle request counts for resource-invariant checks.

use mockall::mock;

use lsu_core::core::interface::{DCachePort, DTlb, DmemRequest, TlbRequest, TlbResponse};

mock! {
    pub DTlb {}
    impl DTlb for DTlb {
        fn translate(&mut self, lane: usize, req: &TlbRequest) -> TlbResponse;
        fn sfence(&mut self);
    }
}

mock! {
    pub DCache {}
    impl DCachePort for DCache {
        fn try_request(&mut self, lane: usize, req: DmemRequest) -> bool;
        fn kill(&mut self, lane: usize);
    }
}

/// Accepts every request and counts them per cycle.
#[derive(Default)]
pub struct CountingDCache {
    /// Requests accepted in the current cycle.
    pub this_cycle: usize,
    /// Maximum accepted in any single cycle.
    pub max_per_cycle: usize,
    /// Total accepted.
    pub total: usize,
    /// Kills observed.
    pub kills: usize,
}

impl CountingDCache {
    /// Starts a new cycle of accounting.
    pub fn begin_cycle(&mut self) {
        self.this_cycle = 0;
    }
}

impl DCachePort for CountingDCache {
    fn try_request(&mut self, _lane: usize, _req: DmemRequest) -> bool {
        self.this_cycle += 1;
        self.total += 1;
        self.max_per_cycle = self.max_per_cycle.max(self.this_cycle);
        true
    }

    fn kill(&mut self, _lane: usize) {
        self.kills += 1;
    }
}
