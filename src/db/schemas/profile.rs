//! Account profile schema
//!
//! Profiles are owned by the account service; this service reads them for
//! unlocked-slot counters and display fields. The payment collaborator
//! raises the per-page counters after a slot-unlock intent is confirmed.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for profiles
pub const PROFILE_COLLECTION: &str = "profiles";

/// Account profile document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProfileDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Account identity (opaque string)
    pub account: String,

    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// City the account plays in, keys into the city-boost document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// Paid-unlock counter for the mining page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mining_slots: Option<u32>,

    /// Paid-unlock counter for the polishing page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polishing_slots: Option<u32>,

    /// Admin override for mining unlocked slots; wins over the counter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mining_slots_override: Option<u32>,

    /// Admin override for polishing unlocked slots; wins over the counter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polishing_slots_override: Option<u32>,
}

impl ProfileDoc {
    /// Unlocked-slot count for a page as the live view reports it:
    /// override, then counter, then the default single free slot.
    pub fn unlocked_slots(&self, mining: bool) -> u32 {
        let (over, counter) = if mining {
            (self.mining_slots_override, self.mining_slots)
        } else {
            (self.polishing_slots_override, self.polishing_slots)
        };
        over.or(counter).unwrap_or(1).max(1)
    }

    /// Paid-unlock counter only, defaulting to the free slot
    pub fn paid_slots(&self, mining: bool) -> u32 {
        let counter = if mining {
            self.mining_slots
        } else {
            self.polishing_slots
        };
        counter.unwrap_or(1).max(1)
    }
}

impl IntoIndexes for ProfileDoc {
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

impl MutMetadata for ProfileDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_counter() {
        let profile = ProfileDoc {
            account: "alice".to_string(),
            mining_slots: Some(4),
            mining_slots_override: Some(7),
            ..ProfileDoc::default()
        };
        assert_eq!(profile.unlocked_slots(true), 7);
        assert_eq!(profile.paid_slots(true), 4);
    }

    #[test]
    fn default_is_one_free_slot() {
        let profile = ProfileDoc {
            account: "bob".to_string(),
            ..ProfileDoc::default()
        };
        assert_eq!(profile.unlocked_slots(true), 1);
        assert_eq!(profile.unlocked_slots(false), 1);
        assert_eq!(profile.paid_slots(false), 1);
    }

    #[test]
    fn zero_counter_clamped_to_free_slot() {
        let profile = ProfileDoc {
            account: "carol".to_string(),
            polishing_slots: Some(0),
            ..ProfileDoc::default()
        };
        assert_eq!(profile.unlocked_slots(false), 1);
    }
}
