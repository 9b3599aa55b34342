//! Production job schemas
//!
//! Active jobs live in their own collection, one document per job, and are
//! deleted on completion in the same transaction that credits the ledger and
//! writes the history record. History is append-only.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::assets::Page;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for active jobs
pub const JOBS_ACTIVE_COLLECTION: &str = "jobs_active";

/// Collection name for completed-job history
pub const JOBS_HISTORY_COLLECTION: &str = "jobs_history";

/// Job lifecycle state; `active -> done` with no other transitions
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Done,
}

/// An active production job bound to one slot
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Generated job identifier (uuid)
    pub job_id: String,

    pub account: String,

    pub page: Page,

    pub slot_num: u32,

    pub started_at: DateTime,

    /// Immutable once created; completion requires wall clock >= finish_at
    pub finish_at: DateTime,

    pub status: JobStatus,

    /// Asset ids that contributed to the job at start time (mining)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_assets: Vec<String>,

    /// Summed power snapshot at start (mining jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_power: Option<u32>,

    /// Rough gems consumed at start (polishing jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in: Option<i64>,
}

impl JobDoc {
    /// Whether the job's timer has elapsed
    pub fn is_finished(&self, now: DateTime) -> bool {
        now.timestamp_millis() >= self.finish_at.timestamp_millis()
    }
}

impl IntoIndexes for JobDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "job_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("job_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "account": 1, "page": 1 },
                Some(
                    IndexOptions::builder()
                        .name("account_page_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for JobDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Completed job snapshot with its production results
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobHistoryDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub job_id: String,

    pub account: String,

    pub page: Page,

    pub slot_num: u32,

    pub started_at: DateTime,

    pub finish_at: DateTime,

    pub completed_at: DateTime,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_assets: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_power: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in: Option<i64>,

    /// Credited resources, keyed by ledger resource key
    pub results: HashMap<String, i64>,
}

impl JobHistoryDoc {
    /// Snapshot an active job together with its results
    pub fn from_job(job: &JobDoc, results: HashMap<String, i64>, completed_at: DateTime) -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            job_id: job.job_id.clone(),
            account: job.account.clone(),
            page: job.page,
            slot_num: job.slot_num,
            started_at: job.started_at,
            finish_at: job.finish_at,
            completed_at,
            input_assets: job.input_assets.clone(),
            computed_power: job.computed_power,
            amount_in: job.amount_in,
            results,
        }
    }
}

impl IntoIndexes for JobHistoryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "account": 1, "completed_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("account_completed_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for JobHistoryDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_only_at_or_after_finish_time() {
        let started = DateTime::from_millis(1_000_000);
        let finish = DateTime::from_millis(1_060_000);
        let job = JobDoc {
            _id: None,
            metadata: Metadata::default(),
            job_id: "j-1".to_string(),
            account: "alice".to_string(),
            page: Page::Mining,
            slot_num: 1,
            started_at: started,
            finish_at: finish,
            status: JobStatus::Active,
            input_assets: vec![],
            computed_power: Some(200),
            amount_in: None,
        };

        assert!(!job.is_finished(DateTime::from_millis(1_059_999)));
        assert!(job.is_finished(DateTime::from_millis(1_060_000)));
        assert!(job.is_finished(DateTime::from_millis(2_000_000)));
    }
}
