//! Database schemas for Lapidary
//!
//! One document type per collection: profiles, staking records, active and
//! historical jobs, ledgers, live views, inventory summaries, and the two
//! global documents.

mod globals;
mod inventory;
mod job;
mod ledger;
mod live_view;
mod metadata;
mod profile;
mod staking;

pub use globals::{CityBoostDoc, PricingDoc, CITY_BOOSTS_ID, GLOBAL_COLLECTION, PRICING_ID};
pub use inventory::{InventorySummaryDoc, SpeedboostItem, INVENTORY_COLLECTION};
pub use job::{JobDoc, JobHistoryDoc, JobStatus, JOBS_ACTIVE_COLLECTION, JOBS_HISTORY_COLLECTION};
pub use ledger::{LedgerDoc, LEDGER_COLLECTION};
pub use live_view::{LiveViewDoc, SlotState, SlotView, UnlockedCounts, LIVE_VIEW_COLLECTION};
pub use metadata::Metadata;
pub use profile::{ProfileDoc, PROFILE_COLLECTION};
pub use staking::{parse_slot_key, slot_key, SlotEntry, StakingRecordDoc, STAKING_COLLECTION};
