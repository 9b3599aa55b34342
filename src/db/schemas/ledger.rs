//! Resource ledger schema
//!
//! Flat per-account mapping from resource key (rough gems plus the ten
//! polished types) to a non-negative count. Debits are guarded server-side:
//! the `$inc` that spends rough is filtered on sufficiency so the balance
//! can never cross zero.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for ledgers
pub const LEDGER_COLLECTION: &str = "ledgers";

/// Per-account resource balances
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LedgerDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub account: String,

    /// Resource key -> count; absent keys read as zero
    #[serde(default)]
    pub balances: HashMap<String, i64>,
}

impl LedgerDoc {
    /// Balance for a resource key, zero if absent
    pub fn balance(&self, resource: &str) -> i64 {
        self.balances.get(resource).copied().unwrap_or(0)
    }
}

impl IntoIndexes for LedgerDoc {
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

impl MutMetadata for LedgerDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
