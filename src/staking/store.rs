//! StakeStore: persistence for staking records
//!
//! Stake is a read-modify-write of the whole record with no transaction;
//! two racing first-time stakes of one asset can both pass the duplicate
//! scan. This is an accepted race: the window is one round trip, and the
//! loser is repaired by the next reconcile sweep. Unstake, by contrast, runs
//! in a multi-document transaction with optimistic retry so concurrent
//! removals never resurrect a pruned branch.

use bson::{doc, DateTime};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::assets::{Page, Role};
use crate::db::mongo::{commit_with_retry, is_transient_txn_error};
use crate::db::schemas::{StakingRecordDoc, STAKING_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::live::{RebuildScheduler, WriteSource};
use crate::logging::{AuditEvent, AuditKind, AuditLogger};
use crate::ownership::AssetOwnershipValidator;
use crate::staking::record::{self, StakeRequest};
use crate::types::{LapidaryError, Result};

/// Transaction attempts before an unstake gives up
const MAX_TXN_RETRIES: u32 = 3;

/// Per-asset failure from a best-effort batch
#[derive(Debug)]
pub struct UnstakeFailure {
    pub asset_id: String,
    pub error: LapidaryError,
}

/// Canonical store for per-account staking records
pub struct StakeStore {
    mongo: MongoClient,
    records: MongoCollection<StakingRecordDoc>,
    validator: Arc<AssetOwnershipValidator>,
    audit: Arc<AuditLogger>,
    scheduler: Option<RebuildScheduler>,
}

impl StakeStore {
    pub async fn new(
        mongo: MongoClient,
        validator: Arc<AssetOwnershipValidator>,
        audit: Arc<AuditLogger>,
        scheduler: Option<RebuildScheduler>,
    ) -> Result<Self> {
        let records = mongo.collection(STAKING_COLLECTION).await?;
        Ok(Self {
            mongo,
            records,
            validator,
            audit,
            scheduler,
        })
    }

    /// Load an account's record in normalized shape; never-staked accounts
    /// get an empty record
    pub async fn get(&self, account: &str) -> Result<StakingRecordDoc> {
        let mut record = self
            .records
            .find_one(doc! { "account": account })
            .await?
            .unwrap_or_else(|| StakingRecordDoc::empty(account));
        record::normalize(&mut record);
        Ok(record)
    }

    /// Stake an asset into a slot
    pub async fn stake(
        &self,
        account: &str,
        page: Page,
        slot_num: u32,
        request: StakeRequest,
    ) -> Result<StakingRecordDoc> {
        let asset = record::build_asset(&request)?;

        let outcome = self
            .validator
            .validate(account, std::slice::from_ref(&request.asset_id))
            .await;
        if !outcome.valid && !outcome.degraded {
            return Err(LapidaryError::Ownership(format!(
                "account {} does not own asset {}",
                account, request.asset_id
            )));
        }

        let mut record = self.get(account).await?;
        let displaced = record::apply_stake(&mut record, page, slot_num, asset)?;

        if let Some(ref displaced) = displaced {
            info!(
                account = %account,
                displaced = %displaced.asset_id,
                by = %request.asset_id,
                "speedboost displaced"
            );
            self.audit
                .record(AuditEvent::new(
                    AuditKind::SpeedboostDisplaced,
                    account,
                    serde_json::json!({
                        "page": page.as_str(),
                        "slot_num": slot_num,
                        "displaced": displaced.asset_id,
                        "by": request.asset_id,
                    }),
                ))
                .await;
        }

        // Whole-record read-modify-write; see the module note on the race.
        self.records
            .replace_upsert(doc! { "account": account }, record.clone())
            .await?;

        debug!(account = %account, page = %page, slot_num, "stake persisted");
        self.notify(account);
        Ok(record)
    }

    /// Remove an asset from a slot, transactionally
    pub async fn unstake(
        &self,
        account: &str,
        page: Page,
        slot_num: u32,
        role: Role,
        asset_id: &str,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.unstake_once(account, page, slot_num, role, asset_id).await {
                Ok(domain_result) => {
                    domain_result?;
                    self.notify(account);
                    return Ok(());
                }
                Err(e) if is_transient_txn_error(&e) && attempt < MAX_TXN_RETRIES => {
                    attempt += 1;
                    warn!(
                        account = %account,
                        attempt,
                        "unstake transaction conflicted, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One transactional unstake attempt
    ///
    /// The outer Result is the driver/transaction layer (retryable); the
    /// inner one is the domain outcome (never retried).
    async fn unstake_once(
        &self,
        account: &str,
        page: Page,
        slot_num: u32,
        role: Role,
        asset_id: &str,
    ) -> std::result::Result<Result<()>, mongodb::error::Error> {
        let mut session = self.mongo.inner().start_session().await?;
        session.start_transaction().await?;

        let filter = doc! { "account": account };
        let found = self
            .records
            .inner()
            .find_one(filter.clone())
            .session(&mut session)
            .await?;

        let mut record = match found {
            Some(record) => record,
            None => {
                let _ = session.abort_transaction().await;
                return Ok(Err(LapidaryError::NotFound(format!(
                    "no staking record for account {}",
                    account
                ))));
            }
        };

        record::normalize(&mut record);
        if let Err(e) = record::apply_unstake(&mut record, page, slot_num, role, asset_id) {
            let _ = session.abort_transaction().await;
            return Ok(Err(e));
        }

        if record.mining.is_empty() && record.polishing.is_empty() {
            // Fully pruned record disappears, matching lazy creation
            self.records
                .inner()
                .delete_one(filter)
                .session(&mut session)
                .await?;
        } else {
            record.metadata.updated_at = Some(DateTime::now());
            self.records
                .inner()
                .replace_one(filter, record)
                .session(&mut session)
                .await?;
        }

        commit_with_retry(&mut session).await?;
        Ok(Ok(()))
    }

    /// Best-effort removal of assets the oracle says the account no longer
    /// owns. Individual failures are collected, never aborting the batch.
    pub async fn auto_unstake_missing(
        &self,
        account: &str,
        page: Page,
        slot_num: u32,
        missing_assets: &[String],
    ) -> Result<Vec<UnstakeFailure>> {
        let mut failures = Vec::new();

        for asset_id in missing_assets {
            let record = self.get(account).await?;
            let role = record
                .slot(page, slot_num)
                .and_then(|entry| record::role_in_slot(entry, asset_id));

            let result = match role {
                Some(role) => self.unstake(account, page, slot_num, role, asset_id).await,
                None => Err(LapidaryError::NotFound(format!(
                    "asset {} not staked in {} slot {}",
                    asset_id, page, slot_num
                ))),
            };

            if let Err(error) = result {
                warn!(
                    account = %account,
                    asset_id = %asset_id,
                    "auto-unstake failed: {}",
                    error
                );
                failures.push(UnstakeFailure {
                    asset_id: asset_id.clone(),
                    error,
                });
            }
        }

        Ok(failures)
    }

    fn notify(&self, account: &str) {
        if let Some(ref scheduler) = self.scheduler {
            scheduler.note_write(account, WriteSource::Staking);
        }
    }
}
