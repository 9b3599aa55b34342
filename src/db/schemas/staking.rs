//! Staking record schema
//!
//! One document per account holding both pages. Slots are stored sparsely
//! under `"slot_N"` keys; empty slots and pages are pruned rather than kept
//! as empty containers, so an account that unstakes everything is back to an
//! empty record.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::assets::{Page, StakedAsset};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for staking records
pub const STAKING_COLLECTION: &str = "staking_records";

/// Storage key for a slot number
pub fn slot_key(slot_num: u32) -> String {
    format!("slot_{}", slot_num)
}

/// Parse a storage key back to a slot number
pub fn parse_slot_key(key: &str) -> Option<u32> {
    key.strip_prefix("slot_").and_then(|n| n.parse().ok())
}

/// Occupants of one staking slot
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SlotEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mine: Option<StakedAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<StakedAsset>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<StakedAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gem: Option<StakedAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedboost: Option<StakedAsset>,

    /// Legacy shape: older writers stored a list of speedboosts per slot.
    /// Normalization collapses this into `speedboost`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub speedboosts: Vec<StakedAsset>,
}

impl SlotEntry {
    /// Whether the slot holds no occupants at all
    pub fn is_empty(&self) -> bool {
        self.mine.is_none()
            && self.table.is_none()
            && self.workers.is_empty()
            && self.gem.is_none()
            && self.speedboost.is_none()
            && self.speedboosts.is_empty()
    }

    /// All occupants of the slot, across every role
    pub fn occupants(&self) -> impl Iterator<Item = &StakedAsset> {
        self.mine
            .iter()
            .chain(self.table.iter())
            .chain(self.workers.iter())
            .chain(self.gem.iter())
            .chain(self.speedboost.iter())
            .chain(self.speedboosts.iter())
    }

    /// Total power staked into the slot (mine/table + workers)
    pub fn total_power(&self) -> u32 {
        self.occupants().map(|a| a.attributes.power()).sum()
    }
}

/// Per-account staking record spanning both pages
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StakingRecordDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub account: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mining: BTreeMap<String, SlotEntry>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub polishing: BTreeMap<String, SlotEntry>,
}

impl StakingRecordDoc {
    /// Empty record for an account that has never staked
    pub fn empty(account: &str) -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            account: account.to_string(),
            mining: BTreeMap::new(),
            polishing: BTreeMap::new(),
        }
    }

    pub fn page(&self, page: Page) -> &BTreeMap<String, SlotEntry> {
        match page {
            Page::Mining => &self.mining,
            Page::Polishing => &self.polishing,
        }
    }

    pub fn page_mut(&mut self, page: Page) -> &mut BTreeMap<String, SlotEntry> {
        match page {
            Page::Mining => &mut self.mining,
            Page::Polishing => &mut self.polishing,
        }
    }

    /// Slot entry lookup by page and number
    pub fn slot(&self, page: Page, slot_num: u32) -> Option<&SlotEntry> {
        self.page(page).get(&slot_key(slot_num))
    }

    /// Whether an asset id is staked anywhere in the record, and where
    pub fn locate_asset(&self, asset_id: &str) -> Option<(Page, u32)> {
        for (page, slots) in [(Page::Mining, &self.mining), (Page::Polishing, &self.polishing)] {
            for (key, entry) in slots {
                if entry.occupants().any(|a| a.asset_id == asset_id) {
                    return parse_slot_key(key).map(|n| (page, n));
                }
            }
        }
        None
    }

    /// Drop empty slot entries; callers run this after removals
    pub fn prune(&mut self) {
        self.mining.retain(|_, entry| !entry.is_empty());
        self.polishing.retain(|_, entry| !entry.is_empty());
    }
}

impl IntoIndexes for StakingRecordDoc {
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

impl MutMetadata for StakingRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::RoleAttributes;

    fn worker(id: &str, power: u32) -> StakedAsset {
        StakedAsset {
            asset_id: id.to_string(),
            template_id: "100001".to_string(),
            attributes: RoleAttributes::Worker { power },
        }
    }

    #[test]
    fn slot_keys_round_trip() {
        assert_eq!(slot_key(3), "slot_3");
        assert_eq!(parse_slot_key("slot_3"), Some(3));
        assert_eq!(parse_slot_key("slot_x"), None);
        assert_eq!(parse_slot_key("3"), None);
    }

    #[test]
    fn locate_asset_scans_both_pages() {
        let mut record = StakingRecordDoc::empty("alice");
        record
            .polishing
            .entry(slot_key(2))
            .or_default()
            .workers
            .push(worker("w-1", 10));

        assert_eq!(record.locate_asset("w-1"), Some((Page::Polishing, 2)));
        assert_eq!(record.locate_asset("w-2"), None);
    }

    #[test]
    fn prune_drops_empty_slots() {
        let mut record = StakingRecordDoc::empty("alice");
        record.mining.insert(slot_key(1), SlotEntry::default());
        record
            .mining
            .entry(slot_key(2))
            .or_default()
            .workers
            .push(worker("w-1", 10));

        record.prune();
        assert!(!record.mining.contains_key("slot_1"));
        assert!(record.mining.contains_key("slot_2"));
    }

    #[test]
    fn total_power_sums_mine_and_workers() {
        let mut entry = SlotEntry::default();
        entry.mine = Some(StakedAsset {
            asset_id: "m-1".to_string(),
            template_id: "200001".to_string(),
            attributes: RoleAttributes::Mine { power: 100 },
        });
        entry.workers.push(worker("w-1", 50));
        entry.workers.push(worker("w-2", 50));
        assert_eq!(entry.total_power(), 200);
    }
}
