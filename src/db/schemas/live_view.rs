//! Live view schema
//!
//! The fully-derived per-account snapshot downstream clients poll. It has no
//! independent identity: every rebuild overwrites the whole document, never
//! merging into the previous one.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{Metadata, SpeedboostItem};

/// Collection name for live views
pub const LIVE_VIEW_COLLECTION: &str = "live_views";

/// Runtime state of one slot in the view
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    Active,
}

/// One slot as the client sees it: staking occupancy merged with any
/// matching active job
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SlotView {
    pub slot_num: u32,

    pub state: SlotState,

    /// Summed power staked into the slot
    pub power: u32,

    /// Speedboost fraction applied to the slot
    pub boost: f64,

    /// Worker occupant count
    pub workers: u32,

    /// Asset id of the staked mine or table, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_asset: Option<String>,

    /// Staked gem type, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gem_type: Option<String>,

    /// Gem bonus fraction, zero without a gem
    #[serde(default)]
    pub gem_bonus: f64,

    /// Active job fields, present only while a job runs on this slot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_at: Option<DateTime>,

    /// Power snapshot the running job was started with (mining)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_power: Option<u32>,

    /// Rough being polished by the running job (polishing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in: Option<i64>,
}

impl SlotView {
    /// An idle slot with no occupants
    pub fn idle(slot_num: u32) -> Self {
        Self {
            slot_num,
            state: SlotState::Idle,
            power: 0,
            boost: 0.0,
            workers: 0,
            base_asset: None,
            gem_type: None,
            gem_bonus: 0.0,
            job_id: None,
            started_at: None,
            finish_at: None,
            job_power: None,
            amount_in: None,
        }
    }
}

/// Unlocked-slot counts surfaced per page
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnlockedCounts {
    pub mining: u32,
    pub polishing: u32,
}

/// The derived per-account snapshot
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveViewDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub account: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// Boost fraction of the account's city, zero when unlisted
    #[serde(default)]
    pub city_boost: f64,

    /// Current published price, if the pricing document exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    /// Resource balances copied from the ledger
    #[serde(default)]
    pub balances: HashMap<String, i64>,

    pub unlocked: UnlockedCounts,

    #[serde(default)]
    pub mining_slots: Vec<SlotView>,

    #[serde(default)]
    pub polishing_slots: Vec<SlotView>,

    /// Owned speedboost inventory from the roll-up
    #[serde(default)]
    pub speedboost_inventory: Vec<SpeedboostItem>,

    pub rebuilt_at: DateTime,
}

impl IntoIndexes for LiveViewDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "account": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("account_unique".to_string())
                        .build(),
                ),
            ),
            // Supports the global-write fanout query over recent activity
            (
                doc! { "metadata.updated_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("updated_at_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for LiveViewDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
