//! Lapidary - slot-staking and timed-production backend
//!
//! Accounts stake externally-owned assets into numbered production slots,
//! run timed jobs that convert rough gems into polished ones, and poll a
//! single derived "live" snapshot of their state.
//!
//! ## Services
//!
//! - **Ownership**: redundant-oracle race verifying asset ownership
//! - **Staking**: canonical per-account staking record across two pages
//! - **Production**: the job state machine and ledger mutations
//! - **Live**: read-model aggregation with debounced rebuilds
//! - **Payments**: slot-unlock intents for the payment collaborator

pub mod assets;
pub mod config;
pub mod db;
pub mod live;
pub mod logging;
pub mod nats;
pub mod ownership;
pub mod payments;
pub mod production;
pub mod routes;
pub mod server;
pub mod staking;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{LapidaryError, Result};
