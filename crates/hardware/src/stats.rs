//! Model statistics collection and reporting.
//!
//! This module tracks the counter CSRs of the bounds co-engine and general
//! LSU telemetry. It provides:
//! 1. **Counter CSRs:** The nine architectural counters (signed/unsigned ops,
//!    bndstr/bndclr/bndsrch, memory requests and bytes, cache hits/misses),
//!    updated strictly at queue dequeue and reloadable from a config payload.
//! 2. **Telemetry:** Forwarding, ordering-failure, nack, retry, and occupancy
//!    counts for performance analysis.
//! 3. **Reporting:** A sectioned text report.

/// Initialization payload for the counter CSRs.
///
/// Loaded on a rising `init_wyfy` edge, replacing the current counter values.
#[derive(Clone, Copy, Debug, Default)]
pub struct CounterInit {
    /// PAC-signed memory ops retired.
    pub num_signed_inst: u64,
    /// Unsigned memory ops retired.
    pub num_unsigned_inst: u64,
    /// Bounds-descriptor stores retired.
    pub num_bndstr: u64,
    /// Bounds-descriptor clears retired.
    pub num_bndclr: u64,
    /// Bounds-descriptor searches retired.
    pub num_bndsrch: u64,
    /// Memory requests retired.
    pub num_mem_req: u64,
    /// Bytes moved by retired memory requests.
    pub num_mem_size: u64,
    /// Data-cache hits.
    pub num_cache_hit: u64,
    /// Data-cache misses.
    pub num_cache_miss: u64,
}

/// Statistics structure tracking all model counters.
#[derive(Clone, Debug, Default)]
pub struct LsuStats {
    /// Total model cycles elapsed.
    pub cycles: u64,

    /// PAC-signed memory ops retired (MCQ dequeue).
    pub num_signed_inst: u64,
    /// Unsigned memory ops retired (MCQ dequeue).
    pub num_unsigned_inst: u64,
    /// Bounds-descriptor stores retired (BDQ dequeue).
    pub num_bndstr: u64,
    /// Bounds-descriptor clears retired (BDQ dequeue).
    pub num_bndclr: u64,
    /// Bounds-descriptor searches retired (BDQ dequeue).
    pub num_bndsrch: u64,
    /// Memory requests retired (LDQ/STQ dequeue).
    pub num_mem_req: u64,
    /// Bytes moved by retired memory requests.
    pub num_mem_size: u64,
    /// Data-cache hits (sampled from the cache model).
    pub num_cache_hit: u64,
    /// Data-cache misses (sampled from the cache model).
    pub num_cache_miss: u64,

    /// Loads dispatched into the LDQ.
    pub loads_dispatched: u64,
    /// Stores dispatched into the STQ.
    pub stores_dispatched: u64,
    /// Loads satisfied by store-to-load forwarding.
    pub forwards: u64,
    /// Memory-ordering failures flagged by the search engine.
    pub order_fails: u64,
    /// Cache nacks observed.
    pub nacks: u64,
    /// TLB-miss retries fired.
    pub tlb_retries: u64,
    /// Load wakeups fired.
    pub load_wakeups: u64,
    /// HBT probes fired.
    pub hbt_probes: u64,
    /// Hella-channel requests accepted.
    pub hella_reqs: u64,
    /// Accumulated LDQ occupancy (entries x cycles).
    pub ldq_occupancy: u64,
    /// Accumulated STQ occupancy (entries x cycles).
    pub stq_occupancy: u64,
}

impl LsuStats {
    /// Loads the nine counter CSRs from an initialization payload.
    pub fn load_counters(&mut self, init: &CounterInit) {
        self.num_signed_inst = init.num_signed_inst;
        self.num_unsigned_inst = init.num_unsigned_inst;
        self.num_bndstr = init.num_bndstr;
        self.num_bndclr = init.num_bndclr;
        self.num_bndsrch = init.num_bndsrch;
        self.num_mem_req = init.num_mem_req;
        self.num_mem_size = init.num_mem_size;
        self.num_cache_hit = init.num_cache_hit;
        self.num_cache_miss = init.num_cache_miss;
    }

    /// Snapshot of the nine counter CSRs.
    pub fn counters(&self) -> CounterInit {
        CounterInit {
            num_signed_inst: self.num_signed_inst,
            num_unsigned_inst: self.num_unsigned_inst,
            num_bndstr: self.num_bndstr,
            num_bndclr: self.num_bndclr,
            num_bndsrch: self.num_bndsrch,
            num_mem_req: self.num_mem_req,
            num_mem_size: self.num_mem_size,
            num_cache_hit: self.num_cache_hit,
            num_cache_miss: self.num_cache_miss,
        }
    }
}

/// Section names for selective stats output.
///
/// Valid section identifiers: `"summary"`, `"queues"`, `"ordering"`, `"bounds"`.
/// Pass an empty slice to `print_sections` to print all sections.
pub const STATS_SECTIONS: &[&str] = &["summary", "queues", "ordering", "bounds"];

impl LsuStats {
    /// Prints only the requested statistics sections to stdout.
    ///
    /// Each element of `sections` should be one of `"summary"`, `"queues"`,
    /// `"ordering"`, or `"bounds"`. Pass an empty slice to print all sections.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let cyc = if self.cycles == 0 { 1 } else { self.cycles };

        if want("summary") {
            println!("\n==========================================================");
            println!("LSU SIMULATION STATISTICS");
            println!("==========================================================");
            println!("sim_cycles               {}", self.cycles);
            println!("mem_requests             {}", self.num_mem_req);
            println!("mem_bytes                {}", self.num_mem_size);
            println!(
                "mem_req_per_kcycle       {:.2}",
                (self.num_mem_req as f64 / cyc as f64) * 1000.0
            );
            println!("----------------------------------------------------------");
        }
        if want("queues") {
            println!("QUEUE PRESSURE");
            println!("  dispatch.loads         {}", self.loads_dispatched);
            println!("  dispatch.stores        {}", self.stores_dispatched);
            println!(
                "  ldq.avg_occupancy      {:.2}",
                self.ldq_occupancy as f64 / cyc as f64
            );
            println!(
                "  stq.avg_occupancy      {:.2}",
                self.stq_occupancy as f64 / cyc as f64
            );
            println!("  hella.requests         {}", self.hella_reqs);
            println!("----------------------------------------------------------");
        }
        if want("ordering") {
            println!("ORDERING AND REPLAY");
            println!("  forward.hits           {}", self.forwards);
            println!("  order.failures         {}", self.order_fails);
            println!("  dcache.nacks           {}", self.nacks);
            println!("  tlb.retries            {}", self.tlb_retries);
            println!("  load.wakeups           {}", self.load_wakeups);
            println!("----------------------------------------------------------");
        }
        if want("bounds") {
            let probes_per = if self.num_signed_inst + self.num_unsigned_inst > 0 {
                self.hbt_probes as f64 / (self.num_signed_inst + self.num_unsigned_inst) as f64
            } else {
                0.0
            };
            println!("BOUNDS ENGINE");
            println!("  inst.signed            {}", self.num_signed_inst);
            println!("  inst.unsigned          {}", self.num_unsigned_inst);
            println!("  bnd.str                {}", self.num_bndstr);
            println!("  bnd.clr                {}", self.num_bndclr);
            println!("  bnd.srch               {}", self.num_bndsrch);
            println!("  hbt.probes             {}", self.hbt_probes);
            println!("  hbt.probes_per_op      {:.2}", probes_per);
            println!(
                "  cache hit/miss         {}/{}",
                self.num_cache_hit, self.num_cache_miss
            );
        }
        println!("==========================================================");
    }

    /// Prints all statistics sections to stdout.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
