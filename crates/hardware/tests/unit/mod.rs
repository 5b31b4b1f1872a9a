//! Unit and scenario tests for the load/store unit.
//!
//! Each submodule drives one functional area through the scripted bench
//! (or, for resource checks, through mock ports):
//! - `lsu::forwarding` — store-to-load forwarding and partial-overlap blocking.
//! - `lsu::ordering` — the ordering searches and failure reporting.
//! - `lsu::bounds` — the MCQ/BDQ engines against the hash bounds table.
//! - `lsu::kill` — branch-mispredict squash and exception recovery.
//! - `lsu::replay` — TLB-miss retry, nack wakeup, and uncacheable gating.
//! - `lsu::hella` — the scalar bypass channel end to end.
//! - `lsu::resources` — per-cycle port limits via mock collaborators.

pub mod lsu;
