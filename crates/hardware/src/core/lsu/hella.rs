//! Hella channel: a scalar-request bypass onto the memory port.
//!
//! A second consumer of the cache port used for scalar debug/DMA traffic.
//! One request is serviced at a time by a small sequencer; the arbiter grants
//! it at most one lane per cycle so pipelined traffic is never starved.
//!
//! States: `Ready` accepts a request; `S1` runs translation and the optional
//! cache fire; `S2` checks exceptions; `S2Nack` reports a refusal; `Wait`
//! awaits the response; `Replay` re-fires after a nack; `Dead` swallows a
//! stray response after a faulted-but-fired request.

use crate::common::error::MemException;
use crate::core::interface::{HellaRequest, HellaResponse};
use crate::core::uop::{MemWidth, MicroOp, UopCode};

/// Sequencer state of the hella channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HellaState {
    /// Idle; a new request can be accepted.
    #[default]
    Ready,

    /// Request accepted this cycle; translation ran, cache may have fired.
    S1,

    /// Exception-check stage.
    S2,

    /// Reporting a nack to the client.
    S2Nack,

    /// Waiting for the cache response.
    Wait,

    /// Nacked in flight; waiting for a re-fire grant.
    Replay,

    /// A fault was reported but the cache request already left; the eventual
    /// response must be swallowed.
    Dead,
}

/// Results of stepping the sequencer at the top of a cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct HellaStageOut {
    /// Report a second-stage nack this cycle.
    pub s2_nack: bool,
    /// Report a second-stage exception this cycle.
    pub s2_xcpt: Option<MemException>,
}

/// The hella-channel sequencer.
#[derive(Debug, Default)]
pub struct HellaShim {
    state: HellaState,
    req: Option<HellaRequest>,
    /// Translated address of the in-flight request.
    paddr: u64,
    /// Fault latched during translation.
    xcpt: Option<MemException>,
    /// Translation missed.
    tlb_miss: bool,
    /// The cache accepted the request in S1.
    dc_fired: bool,
}

impl HellaShim {
    /// Creates an idle sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, for inspection.
    pub fn state(&self) -> HellaState {
        self.state
    }

    /// True if a new request can be accepted this cycle.
    pub fn is_ready(&self) -> bool {
        self.state == HellaState::Ready
    }

    /// True if the sequencer wants a re-fire grant.
    pub fn wants_replay(&self) -> bool {
        self.state == HellaState::Replay
    }

    /// The saved request, while one is in flight.
    pub fn request(&self) -> Option<&HellaRequest> {
        self.req.as_ref()
    }

    /// Translated address of the in-flight request.
    pub fn paddr(&self) -> u64 {
        self.paddr
    }

    /// Advances the front of the sequencer at the top of a cycle.
    ///
    /// `S1` dwells one cycle into `S2`; `S2` resolves into reporting,
    /// waiting, or death; `S2Nack` emits its report and frees the channel.
    pub fn step(&mut self) -> HellaStageOut {
        let mut out = HellaStageOut::default();
        match self.state {
            HellaState::S1 => {
                self.state = HellaState::S2;
            }
            HellaState::S2 => {
                if let Some(x) = self.xcpt {
                    out.s2_xcpt = Some(x);
                    // A fault after the request left: the response still
                    // arrives and must be swallowed.
                    self.state = if self.dc_fired {
                        HellaState::Dead
                    } else {
                        self.clear();
                        HellaState::Ready
                    };
                } else if self.tlb_miss || !self.dc_fired {
                    self.state = HellaState::S2Nack;
                } else {
                    self.state = HellaState::Wait;
                }
            }
            HellaState::S2Nack => {
                out.s2_nack = true;
                self.clear();
                self.state = HellaState::Ready;
            }
            _ => {}
        }
        out
    }

    /// Records the S1 outcome of an accepted request.
    pub fn accept(
        &mut self,
        req: HellaRequest,
        paddr: u64,
        tlb_miss: bool,
        xcpt: Option<MemException>,
        dc_fired: bool,
    ) {
        debug_assert_eq!(self.state, HellaState::Ready);
        self.req = Some(req);
        self.paddr = paddr;
        self.tlb_miss = tlb_miss;
        self.xcpt = xcpt;
        self.dc_fired = dc_fired;
        self.state = HellaState::S1;
    }

    /// Records a replay grant: the request went back out on the port.
    pub fn replayed(&mut self) {
        debug_assert_eq!(self.state, HellaState::Replay);
        self.state = HellaState::Wait;
    }

    /// Handles a cache response bearing `is_hella`.
    ///
    /// A fast cache can answer while the sequencer is still in its check
    /// stage; any post-fire state accepts the data. Returns the
    /// client-facing completion, or `None` when the response is swallowed
    /// (dead request) or unexpected.
    pub fn on_response(&mut self, data: u64) -> Option<HellaResponse> {
        match self.state {
            HellaState::S2 | HellaState::Wait if self.dc_fired && self.xcpt.is_none() => {
                let req = self.req.take()?;
                let resp = HellaResponse {
                    data: extend(data, req.size, req.signed),
                    addr: req.addr,
                    tag: req.tag,
                    cmd: req.cmd,
                    signed: req.signed,
                    size: req.size,
                };
                self.clear();
                self.state = HellaState::Ready;
                Some(resp)
            }
            HellaState::Dead => {
                self.clear();
                self.state = HellaState::Ready;
                None
            }
            _ => None,
        }
    }

    /// Handles a cache nack bearing `is_hella`.
    pub fn on_nack(&mut self) {
        if matches!(self.state, HellaState::S2 | HellaState::Wait) && self.dc_fired {
            self.state = HellaState::Replay;
        }
    }

    /// Builds the synthetic micro-op that rides the cache port.
    pub fn mem_uop(&self) -> MicroOp {
        let req = self.req.as_ref().expect("hella uop without a request");
        MicroOp {
            code: UopCode::Load,
            mem_cmd: req.cmd,
            width: req.size,
            signed_load: req.signed,
            is_hella: true,
            ..Default::default()
        }
    }

    fn clear(&mut self) {
        self.req = None;
        self.paddr = 0;
        self.tlb_miss = false;
        self.xcpt = None;
        self.dc_fired = false;
    }
}

/// Sign- or zero-extends raw response data to the request width.
fn extend(data: u64, size: MemWidth, signed: bool) -> u64 {
    match (size, signed) {
        (MemWidth::Byte, true) => data as u8 as i8 as i64 as u64,
        (MemWidth::Half, true) => data as u16 as i16 as i64 as u64,
        (MemWidth::Word, true) => data as u32 as i32 as i64 as u64,
        (MemWidth::Byte, false) => data as u8 as u64,
        (MemWidth::Half, false) => data as u16 as u64,
        (MemWidth::Word, false) => data as u32 as u64,
        (MemWidth::Double, _) => data,
    }
}
