//! Global documents: pricing and city boosts
//!
//! Two singleton documents in one collection, published by external
//! collaborators and read-only here. Writes to either fan out rebuilds to
//! recently-active accounts.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection holding the global singleton documents
pub const GLOBAL_COLLECTION: &str = "global";

/// Fixed key of the pricing document
pub const PRICING_ID: &str = "pricing";

/// Fixed key of the city-boost document
pub const CITY_BOOSTS_ID: &str = "city_boosts";

/// Published market price document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PricingDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Singleton key, always [`PRICING_ID`]
    pub key: String,

    /// Current numeric price; opaque beyond display
    pub current_price: f64,
}

impl IntoIndexes for PricingDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "key": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("key_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for PricingDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Published per-city boost fractions
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CityBoostDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Singleton key, always [`CITY_BOOSTS_ID`]
    pub key: String,

    /// City name -> boost fraction
    #[serde(default)]
    pub boosts: HashMap<String, f64>,
}

impl CityBoostDoc {
    /// Boost fraction for a city, zero if unlisted
    pub fn boost_for(&self, city: &str) -> f64 {
        self.boosts.get(city).copied().unwrap_or(0.0)
    }
}

impl IntoIndexes for CityBoostDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "key": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("key_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for CityBoostDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
