//! Mock collaborators for driving the LSU without the behavioral models.

pub mod dmem;

pub use dmem::{CountingDCache, MockDCache, MockDTlb};
