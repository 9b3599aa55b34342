//! Slot staking
//!
//! The canonical per-account staking record: which asset occupies which
//! (page, slot, role). Pure record mutations live in [`record`]; [`store`]
//! wires them to persistence and the ownership check.

pub mod record;
pub mod store;

pub use record::StakeRequest;
pub use store::{StakeStore, UnstakeFailure};
