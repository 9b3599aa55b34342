//! Live view derivation
//!
//! The aggregator reads every independently-written source for an account
//! and overwrites one derived snapshot. The scheduler debounces qualifying
//! writes so a burst triggers at most one rebuild per quiet window.

pub mod aggregator;
pub mod scheduler;

pub use aggregator::{AggregateSources, LiveAggregator, Rebuilder};
pub use scheduler::{GlobalDoc, RebuildScheduler, WriteSource};
