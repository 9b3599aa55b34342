//! Inventory summary schema
//!
//! Roll-up of an account's owned assets, written by the inventory sync
//! service and read here for effective-slot computation and the live view's
//! speedboost inventory.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for inventory summaries
pub const INVENTORY_COLLECTION: &str = "inventory_summaries";

/// An owned speedboost asset in inventory (not necessarily staked)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SpeedboostItem {
    pub asset_id: String,
    pub template_id: String,
    pub boost: f64,
}

/// Per-account owned-asset roll-up
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct InventorySummaryDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub account: String,

    /// Owned-asset count per template id
    #[serde(default)]
    pub template_counts: HashMap<String, i64>,

    /// Slot-granting assets counted toward mining capacity
    #[serde(default)]
    pub mining_slot_assets: u32,

    /// Slot-granting assets counted toward polishing capacity
    #[serde(default)]
    pub polishing_slot_assets: u32,

    /// Owned speedboosts, surfaced in the live view
    #[serde(default)]
    pub speedboosts: Vec<SpeedboostItem>,
}

impl InventorySummaryDoc {
    /// Slot capacity derived from owned assets for a page; an account always
    /// derives at least the free slot
    pub fn asset_derived_slots(&self, mining: bool) -> u32 {
        let assets = if mining {
            self.mining_slot_assets
        } else {
            self.polishing_slot_assets
        };
        assets.max(1)
    }
}

impl IntoIndexes for InventorySummaryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "account": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("account_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for InventorySummaryDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
