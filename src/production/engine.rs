//! SlotProductionEngine
//!
//! Starts and completes timed production jobs against staked slots. Job
//! creation and the ledger debit that funds it commit together, as do
//! completion, the ledger credit, and the history write. A job that is never
//! completed simply stays active; there is no cancel or fail transition.

use bson::{doc, DateTime};
use rand::thread_rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assets::{catalog, Page};
use crate::db::mongo::{commit_with_retry, is_transient_txn_error};
use crate::db::schemas::{
    InventorySummaryDoc, JobDoc, JobHistoryDoc, JobStatus, LedgerDoc, Metadata, ProfileDoc,
    INVENTORY_COLLECTION, JOBS_ACTIVE_COLLECTION, JOBS_HISTORY_COLLECTION, LEDGER_COLLECTION,
    PROFILE_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::live::{RebuildScheduler, WriteSource};
use crate::payments::{PaymentEmitter, PaymentIntent};
use crate::staking::StakeStore;
use crate::types::{LapidaryError, Result};

/// Transaction attempts before a job operation gives up
const MAX_TXN_RETRIES: u32 = 3;

/// Fixed per-page job durations
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mining_duration: Duration,
    pub polishing_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mining_duration: Duration::from_secs(3600),
            polishing_duration: Duration::from_secs(1800),
        }
    }
}

impl EngineConfig {
    fn duration(&self, page: Page) -> Duration {
        match page {
            Page::Mining => self.mining_duration,
            Page::Polishing => self.polishing_duration,
        }
    }
}

/// Caller inputs for starting a job
#[derive(Debug, Clone, Default)]
pub struct JobInputs {
    /// Explicit slot; otherwise the smallest free one is picked
    pub requested_slot: Option<u32>,
    /// Rough gems to polish (polishing page only)
    pub amount_in: Option<i64>,
}

/// The job state machine over staked slots
pub struct SlotProductionEngine {
    mongo: MongoClient,
    jobs: MongoCollection<JobDoc>,
    history: MongoCollection<JobHistoryDoc>,
    ledgers: MongoCollection<LedgerDoc>,
    profiles: MongoCollection<ProfileDoc>,
    inventory: MongoCollection<InventorySummaryDoc>,
    stake_store: Arc<StakeStore>,
    payments: Arc<PaymentEmitter>,
    scheduler: Option<RebuildScheduler>,
    config: EngineConfig,
}

impl SlotProductionEngine {
    pub async fn new(
        mongo: MongoClient,
        stake_store: Arc<StakeStore>,
        payments: Arc<PaymentEmitter>,
        scheduler: Option<RebuildScheduler>,
        config: EngineConfig,
    ) -> Result<Self> {
        let jobs = mongo.collection(JOBS_ACTIVE_COLLECTION).await?;
        let history = mongo.collection(JOBS_HISTORY_COLLECTION).await?;
        let ledgers = mongo.collection(LEDGER_COLLECTION).await?;
        let profiles = mongo.collection(PROFILE_COLLECTION).await?;
        let inventory = mongo.collection(INVENTORY_COLLECTION).await?;
        Ok(Self {
            mongo,
            jobs,
            history,
            ledgers,
            profiles,
            inventory,
            stake_store,
            payments,
            scheduler,
            config,
        })
    }

    /// Active jobs for an account and page
    pub async fn active_jobs(&self, account: &str, page: Page) -> Result<Vec<JobDoc>> {
        self.jobs
            .find_many(doc! { "account": account, "page": page.as_str() })
            .await
    }

    /// Slot capacity for a page: the larger of asset-derived and paid
    /// unlocks, never above MAX_SLOTS
    pub async fn effective_slots(&self, account: &str, page: Page) -> Result<u32> {
        let mining = page == Page::Mining;
        let manual = self
            .profiles
            .find_one(doc! { "account": account })
            .await?
            .map(|p| p.paid_slots(mining))
            .unwrap_or(1);
        let derived = self
            .inventory
            .find_one(doc! { "account": account })
            .await?
            .map(|i| i.asset_derived_slots(mining))
            .unwrap_or(1);
        Ok(effective_slot_count(derived, manual))
    }

    /// Start a production job
    pub async fn start_job(
        &self,
        account: &str,
        page: Page,
        inputs: JobInputs,
    ) -> Result<JobDoc> {
        let effective = self.effective_slots(account, page).await?;
        let active = self.active_jobs(account, page).await?;

        if active.len() as u32 >= effective {
            return Err(LapidaryError::SlotsExhausted(format!(
                "{} active jobs fill all {} {} slots",
                active.len(),
                effective,
                page
            )));
        }

        let used: HashSet<u32> = active.iter().map(|j| j.slot_num).collect();
        let slot_num = resolve_slot(inputs.requested_slot, &used, effective)?;

        let started_at = DateTime::now();
        let finish_at = DateTime::from_millis(
            started_at.timestamp_millis() + self.config.duration(page).as_millis() as i64,
        );

        let mut job = JobDoc {
            _id: None,
            metadata: Metadata::default(),
            job_id: Uuid::new_v4().to_string(),
            account: account.to_string(),
            page,
            slot_num,
            started_at,
            finish_at,
            status: JobStatus::Active,
            input_assets: Vec::new(),
            computed_power: None,
            amount_in: None,
        };

        match page {
            Page::Mining => {
                let record = self.stake_store.get(account).await?;
                let (power, assets) = match record.slot(page, slot_num) {
                    Some(entry) => {
                        let assets = entry
                            .mine
                            .iter()
                            .chain(entry.workers.iter())
                            .map(|a| a.asset_id.clone())
                            .collect();
                        (entry.total_power(), assets)
                    }
                    None => (0, Vec::new()),
                };
                job.computed_power = Some(power);
                job.input_assets = assets;
                self.jobs.insert_one(job.clone()).await?;
            }
            Page::Polishing => {
                let amount = inputs.amount_in.ok_or_else(|| {
                    LapidaryError::Validation("amount_in is required for polishing jobs".into())
                })?;
                if amount < 1 || amount > catalog::MAX_AMOUNT_PER_SLOT {
                    return Err(LapidaryError::Validation(format!(
                        "amount_in {} out of range 1..={}",
                        amount,
                        catalog::MAX_AMOUNT_PER_SLOT
                    )));
                }
                job.amount_in = Some(amount);
                self.start_polishing_txn(account, &job, amount).await?;
            }
        }

        info!(
            account = %account,
            page = %page,
            slot_num,
            job_id = %job.job_id,
            "job started"
        );
        self.notify(account, WriteSource::Job);
        Ok(job)
    }

    /// Debit rough and create the polishing job in one transaction
    async fn start_polishing_txn(&self, account: &str, job: &JobDoc, amount: i64) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.start_polishing_once(account, job, amount).await {
                Ok(domain_result) => {
                    domain_result?;
                    self.notify(account, WriteSource::Ledger);
                    return Ok(());
                }
                Err(e) if is_transient_txn_error(&e) && attempt < MAX_TXN_RETRIES => {
                    attempt += 1;
                    warn!(account = %account, attempt, "polishing start conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn start_polishing_once(
        &self,
        account: &str,
        job: &JobDoc,
        amount: i64,
    ) -> std::result::Result<Result<()>, mongodb::error::Error> {
        let mut session = self.mongo.inner().start_session().await?;
        session.start_transaction().await?;

        // Guarded debit: the filter enforces sufficiency in the same step
        let balance_key = format!("balances.{}", catalog::ROUGH);
        let mut filter = doc! { "account": account };
        filter.insert(balance_key.as_str(), doc! { "$gte": amount });
        let mut inc = bson::Document::new();
        inc.insert(balance_key.as_str(), -amount);
        let debit = self
            .ledgers
            .inner()
            .update_one(
                filter,
                doc! {
                    "$inc": inc,
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .session(&mut session)
            .await?;

        if debit.modified_count == 0 {
            let _ = session.abort_transaction().await;
            return Ok(Err(LapidaryError::InsufficientResource(format!(
                "account {} lacks {} rough",
                account, amount
            ))));
        }

        let mut doc = job.clone();
        doc.metadata = Metadata::new();
        self.jobs
            .inner()
            .insert_one(doc)
            .session(&mut session)
            .await?;

        commit_with_retry(&mut session).await?;
        Ok(Ok(()))
    }

    /// Complete a finished job, crediting its production
    pub async fn complete_job(&self, account: &str, job_id: &str) -> Result<JobHistoryDoc> {
        let mut attempt = 0;
        loop {
            match self.complete_once(account, job_id).await {
                Ok(domain_result) => {
                    let history = domain_result?;
                    self.notify(account, WriteSource::Job);
                    self.notify(account, WriteSource::Ledger);
                    return Ok(history);
                }
                Err(e) if is_transient_txn_error(&e) && attempt < MAX_TXN_RETRIES => {
                    attempt += 1;
                    warn!(account = %account, job_id = %job_id, attempt, "completion conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn complete_once(
        &self,
        account: &str,
        job_id: &str,
    ) -> std::result::Result<Result<JobHistoryDoc>, mongodb::error::Error> {
        let mut session = self.mongo.inner().start_session().await?;
        session.start_transaction().await?;

        let filter = doc! { "account": account, "job_id": job_id };
        let job = match self
            .jobs
            .inner()
            .find_one(filter.clone())
            .session(&mut session)
            .await?
        {
            Some(job) => job,
            None => {
                let _ = session.abort_transaction().await;
                return Ok(Err(LapidaryError::NotFound(format!(
                    "no active job {} for account {}",
                    job_id, account
                ))));
            }
        };

        let now = DateTime::now();
        if !job.is_finished(now) {
            let _ = session.abort_transaction().await;
            return Ok(Err(LapidaryError::StillRunning(format!(
                "job {} finishes at {}",
                job_id, job.finish_at
            ))));
        }

        let results = job_results(&job);

        // Credit, snapshot, and removal commit together or not at all
        let mut credit = doc! { "$set": { "metadata.updated_at": now } };
        let mut incs = bson::Document::new();
        for (resource, count) in &results {
            incs.insert(format!("balances.{}", resource), *count);
        }
        credit.insert("$inc", incs);
        self.ledgers
            .inner()
            .update_one(doc! { "account": account }, credit)
            .upsert(true)
            .session(&mut session)
            .await?;

        let mut history = JobHistoryDoc::from_job(&job, results, now);
        history.metadata = Metadata::new();
        self.history
            .inner()
            .insert_one(history.clone())
            .session(&mut session)
            .await?;

        let deleted = self
            .jobs
            .inner()
            .delete_one(filter)
            .session(&mut session)
            .await?;
        if deleted.deleted_count == 0 {
            // Lost the completion race
            let _ = session.abort_transaction().await;
            return Ok(Err(LapidaryError::NotFound(format!(
                "job {} already completed",
                job_id
            ))));
        }

        commit_with_retry(&mut session).await?;
        debug!(account = %account, job_id = %job_id, "job completed");
        Ok(Ok(history))
    }

    /// Request the next slot unlock; payment is the collaborator's job
    pub async fn unlock_slot(
        &self,
        account: &str,
        page: Page,
        target_slot: u32,
    ) -> Result<PaymentIntent> {
        let mining = page == Page::Mining;
        let current = self
            .profiles
            .find_one(doc! { "account": account })
            .await?
            .map(|p| p.paid_slots(mining))
            .unwrap_or(1);

        check_unlock_sequence(current, target_slot)?;

        let amount = catalog::unlock_cost(target_slot).ok_or_else(|| {
            LapidaryError::Validation(format!("no unlock cost for slot {}", target_slot))
        })?;

        let intent = PaymentIntent::for_unlock(
            amount,
            self.payments.destination(),
            account,
            page,
            target_slot,
        );
        self.payments.emit(intent.clone()).await?;
        Ok(intent)
    }

    fn notify(&self, account: &str, source: WriteSource) {
        if let Some(ref scheduler) = self.scheduler {
            scheduler.note_write(account, source);
        }
    }
}

/// Production results for a finished job
fn job_results(job: &JobDoc) -> HashMap<String, i64> {
    match job.page {
        Page::Mining => {
            let power = job.computed_power.unwrap_or(0);
            HashMap::from([(catalog::ROUGH.to_string(), catalog::mining_yield(power))])
        }
        Page::Polishing => {
            let amount = job.amount_in.unwrap_or(0);
            catalog::draw_polish_outputs(&mut thread_rng(), amount)
        }
    }
}

/// Clamp the per-page slot capacity
fn effective_slot_count(asset_derived: u32, manually_unlocked: u32) -> u32 {
    asset_derived.max(manually_unlocked).max(1).min(catalog::MAX_SLOTS)
}

/// Unlocks are strictly sequential: target must be exactly current + 1
fn check_unlock_sequence(current: u32, target: u32) -> Result<()> {
    if current >= catalog::MAX_SLOTS {
        return Err(LapidaryError::Conflict(format!(
            "all {} slots already unlocked",
            catalog::MAX_SLOTS
        )));
    }
    if target != current + 1 {
        return Err(LapidaryError::Conflict(format!(
            "slot {} cannot be unlocked while {} are unlocked; unlocks are sequential",
            target, current
        )));
    }
    Ok(())
}

/// Pick the slot a new job runs on
fn resolve_slot(requested: Option<u32>, used: &HashSet<u32>, effective: u32) -> Result<u32> {
    match requested {
        Some(slot) => {
            if slot < 1 || slot > effective {
                return Err(LapidaryError::Validation(format!(
                    "slot {} outside unlocked range 1..={}",
                    slot, effective
                )));
            }
            if used.contains(&slot) {
                return Err(LapidaryError::Conflict(format!(
                    "slot {} already has an active job",
                    slot
                )));
            }
            Ok(slot)
        }
        None => (1..=effective)
            .find(|n| !used.contains(n))
            .ok_or_else(|| {
                LapidaryError::SlotsExhausted(format!("no free slot in 1..={}", effective))
            }),
    }
}
