//! Timed production jobs
//!
//! The job state machine (active -> done) plus slot capacity and the
//! slot-unlock payment flow.

pub mod engine;

pub use engine::{EngineConfig, JobInputs, SlotProductionEngine};
