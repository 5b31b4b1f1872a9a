//! Behavioral data-cache model.
//!
//! Implements the `DCachePort` handshake over a sparse byte-addressed backing
//! store with a fixed response latency. Test and scenario hooks allow
//! scripted nacks (per address), scripted request refusals (backpressure),
//! and injected release events. Requests killed in their issue cycle never
//! produce a response. Hit/miss accounting is block-granular: the first
//! touch of a block is a miss, later touches hit.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::config::DCacheModelConfig;
use crate::core::interface::{DCachePort, DmemNack, DmemOutputs, DmemRequest, DmemResponse};
use crate::core::uop::{MemCmd, MemWidth};

/// One request in the response pipe.
#[derive(Clone, Debug)]
struct Inflight {
    ready_at: u64,
    lane: usize,
    req: DmemRequest,
    killed: bool,
    nack: bool,
}

/// Behavioral data cache with a fixed-latency response pipe.
pub struct DCacheModel {
    latency: u64,
    block_bytes: u64,
    cycle: u64,
    mem: BTreeMap<u64, u8>,
    inflight: Vec<Inflight>,
    /// Index into `inflight` of the request accepted on each lane this
    /// cycle, for the late kill.
    accepted: HashMap<usize, usize>,
    /// Remaining scripted nacks per double-word address.
    nack_script: HashMap<u64, u32>,
    /// Requests to refuse outright (backpressure).
    refusals: u32,
    /// Release events to surface, one per cycle.
    releases: VecDeque<u64>,
    touched_blocks: HashSet<u64>,
    /// Block-granular hits observed.
    pub hits: u64,
    /// Block-granular misses observed.
    pub misses: u64,
}

impl DCacheModel {
    /// Creates a model from its config section.
    pub fn new(config: &DCacheModelConfig) -> Self {
        Self {
            latency: config.latency.max(1),
            block_bytes: config.block_bytes,
            cycle: 0,
            mem: BTreeMap::new(),
            inflight: Vec::new(),
            accepted: HashMap::new(),
            nack_script: HashMap::new(),
            refusals: 0,
            releases: VecDeque::new(),
            touched_blocks: HashSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Starts a new cycle and collects everything that matures in it.
    pub fn tick(&mut self) -> DmemOutputs {
        self.cycle += 1;
        self.accepted.clear();

        let mut out = DmemOutputs::default();
        let due: Vec<Inflight> = {
            let cycle = self.cycle;
            let (ready, rest): (Vec<_>, Vec<_>) =
                self.inflight.drain(..).partition(|f| f.ready_at <= cycle);
            self.inflight = rest;
            ready
        };

        for f in due {
            if f.killed {
                continue;
            }
            if f.nack {
                out.nacks.push(DmemNack {
                    uop: f.req.uop,
                });
                continue;
            }
            let data = self.perform(&f.req);
            out.responses.push(DmemResponse {
                lane: f.lane,
                uop: f.req.uop,
                data,
            });
        }

        out.ordered = self.inflight.is_empty();
        out.release = self.releases.pop_front();
        out
    }

    /// Executes a matured request against the backing store.
    fn perform(&mut self, req: &DmemRequest) -> u64 {
        let width = req.uop.width;
        match req.uop.mem_cmd {
            MemCmd::Read | MemCmd::Lr => self.read(req.addr, width),
            MemCmd::Write => {
                self.write(req.addr, req.data, width);
                0
            }
            MemCmd::Sc => {
                // The reservation window is tracked by the LSU; by the time
                // an SC drains here it has been allowed to succeed.
                self.write(req.addr, req.data, width);
                0
            }
            MemCmd::Amo => {
                let old = self.read(req.addr, width);
                self.write(req.addr, req.data, width);
                old
            }
        }
    }

    /// Reads `width` bytes, little-endian.
    pub fn read(&self, addr: u64, width: MemWidth) -> u64 {
        let mut v = 0u64;
        for i in (0..width.bytes() as u64).rev() {
            v = (v << 8) | *self.mem.get(&(addr + i)).unwrap_or(&0) as u64;
        }
        v
    }

    /// Writes `width` bytes, little-endian.
    pub fn write(&mut self, addr: u64, data: u64, width: MemWidth) {
        for i in 0..width.bytes() as u64 {
            self.mem.insert(addr + i, (data >> (i * 8)) as u8);
        }
    }

    /// Backdoor double-word write for scenario setup.
    pub fn poke(&mut self, addr: u64, data: u64) {
        self.write(addr, data, MemWidth::Double);
    }

    /// Backdoor double-word read for assertions.
    pub fn peek(&self, addr: u64) -> u64 {
        self.read(addr, MemWidth::Double)
    }

    /// Scripts `count` nacks for requests touching `addr`'s double-word.
    pub fn script_nack(&mut self, addr: u64, count: u32) {
        self.nack_script.insert(addr & !0x7, count);
    }

    /// Refuses the next `count` requests at the port (backpressure).
    pub fn script_refusals(&mut self, count: u32) {
        self.refusals += count;
    }

    /// Queues a release event for the block containing `addr`.
    pub fn push_release(&mut self, addr: u64) {
        self.releases.push_back(addr & !(self.block_bytes - 1));
    }
}

impl DCachePort for DCacheModel {
    fn try_request(&mut self, lane: usize, req: DmemRequest) -> bool {
        if self.refusals > 0 {
            self.refusals -= 1;
            return false;
        }

        let nack = match self.nack_script.get_mut(&(req.addr & !0x7)) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };

        let block = req.addr & !(self.block_bytes - 1);
        if self.touched_blocks.insert(block) {
            self.misses += 1;
        } else {
            self.hits += 1;
        }

        self.inflight.push(Inflight {
            ready_at: self.cycle + self.latency,
            lane,
            req,
            killed: false,
            nack,
        });
        self.accepted.insert(lane, self.inflight.len() - 1);
        true
    }

    fn kill(&mut self, lane: usize) {
        if let Some(&idx) = self.accepted.get(&lane) {
            self.inflight[idx].killed = true;
        }
    }
}
