//! LiveAggregator
//!
//! Rebuilds the per-account live view from profile, ledger, inventory
//! summary, staking record, active jobs, and the two global documents. The
//! derivation is pure ([`compose`]); the aggregator wires it to reads and
//! the full-document overwrite. Any read or derivation failure aborts the
//! whole rebuild and the previous snapshot stays.
//!
//! Unlock state is authoritative: staking or job entries beyond the
//! unlocked count are dropped (and audited), never shown. A job with no
//! matching staking entry still yields a fallback slot view, since a
//! running job is stronger evidence than staking bookkeeping.

use async_trait::async_trait;
use bson::{doc, DateTime};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::assets::{Page, RoleAttributes};
use crate::db::schemas::{
    parse_slot_key, CityBoostDoc, InventorySummaryDoc, JobDoc, LedgerDoc, LiveViewDoc,
    PricingDoc, ProfileDoc, SlotEntry, SlotState, SlotView, StakingRecordDoc, UnlockedCounts,
    CITY_BOOSTS_ID, GLOBAL_COLLECTION, INVENTORY_COLLECTION, JOBS_ACTIVE_COLLECTION,
    LEDGER_COLLECTION, LIVE_VIEW_COLLECTION, PRICING_ID, PROFILE_COLLECTION, STAKING_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::logging::{AuditEvent, AuditKind, AuditLogger};
use crate::staking::record;
use crate::types::Result;

/// Everything a rebuild reads, gathered before derivation starts
#[derive(Debug, Default)]
pub struct AggregateSources {
    pub profile: Option<ProfileDoc>,
    pub ledger: Option<LedgerDoc>,
    pub inventory: Option<InventorySummaryDoc>,
    pub staking: StakingRecordDoc,
    pub mining_jobs: Vec<JobDoc>,
    pub polishing_jobs: Vec<JobDoc>,
    pub pricing: Option<PricingDoc>,
    pub city_boosts: Option<CityBoostDoc>,
}

/// A staking or job entry excluded from the view
#[derive(Debug, PartialEq, Eq)]
pub struct DroppedEntry {
    pub page: Page,
    pub slot_num: u32,
    pub reason: &'static str,
}

/// Seam the scheduler drives rebuilds through
#[async_trait]
pub trait Rebuilder: Send + Sync {
    /// Rebuild one account's live view
    async fn rebuild_account(&self, account: &str) -> Result<()>;

    /// Accounts with live-view activity inside the lookback window
    async fn recently_active(&self, lookback: Duration, cap: i64) -> Result<Vec<String>>;
}

/// Derives and overwrites per-account live views
pub struct LiveAggregator {
    profiles: MongoCollection<ProfileDoc>,
    ledgers: MongoCollection<LedgerDoc>,
    inventory: MongoCollection<InventorySummaryDoc>,
    staking: MongoCollection<StakingRecordDoc>,
    jobs: MongoCollection<JobDoc>,
    pricing: MongoCollection<PricingDoc>,
    city_boosts: MongoCollection<CityBoostDoc>,
    live_views: MongoCollection<LiveViewDoc>,
    audit: Arc<AuditLogger>,
}

impl LiveAggregator {
    pub async fn new(mongo: MongoClient, audit: Arc<AuditLogger>) -> Result<Self> {
        Ok(Self {
            profiles: mongo.collection(PROFILE_COLLECTION).await?,
            ledgers: mongo.collection(LEDGER_COLLECTION).await?,
            inventory: mongo.collection(INVENTORY_COLLECTION).await?,
            staking: mongo.collection(STAKING_COLLECTION).await?,
            jobs: mongo.collection(JOBS_ACTIVE_COLLECTION).await?,
            pricing: mongo.collection(GLOBAL_COLLECTION).await?,
            city_boosts: mongo.collection(GLOBAL_COLLECTION).await?,
            live_views: mongo.collection(LIVE_VIEW_COLLECTION).await?,
            audit,
        })
    }

    /// Read every source for an account
    async fn gather(&self, account: &str) -> Result<AggregateSources> {
        let account_filter = doc! { "account": account };

        let mut staking = self
            .staking
            .find_one(account_filter.clone())
            .await?
            .unwrap_or_else(|| StakingRecordDoc::empty(account));
        record::normalize(&mut staking);

        let jobs = self.jobs.find_many(account_filter.clone()).await?;
        let (mining_jobs, polishing_jobs) =
            jobs.into_iter().partition(|j: &JobDoc| j.page == Page::Mining);

        Ok(AggregateSources {
            profile: self.profiles.find_one(account_filter.clone()).await?,
            ledger: self.ledgers.find_one(account_filter.clone()).await?,
            inventory: self.inventory.find_one(account_filter).await?,
            staking,
            mining_jobs,
            polishing_jobs,
            pricing: self.pricing.find_one(doc! { "key": PRICING_ID }).await?,
            city_boosts: self
                .city_boosts
                .find_one(doc! { "key": CITY_BOOSTS_ID })
                .await?,
        })
    }

    /// Rebuild one account's snapshot and overwrite it in full
    pub async fn rebuild(&self, account: &str) -> Result<()> {
        let sources = self.gather(account).await?;
        let (view, dropped) = compose(account, &sources, DateTime::now());

        for entry in &dropped {
            self.audit
                .record(AuditEvent::new(
                    AuditKind::SlotEntryDropped,
                    account,
                    serde_json::json!({
                        "page": entry.page.as_str(),
                        "slot_num": entry.slot_num,
                        "reason": entry.reason,
                    }),
                ))
                .await;
        }

        self.live_views
            .replace_upsert(doc! { "account": account }, view)
            .await?;

        debug!(account = %account, dropped = dropped.len(), "live view rebuilt");
        Ok(())
    }
}

#[async_trait]
impl Rebuilder for LiveAggregator {
    async fn rebuild_account(&self, account: &str) -> Result<()> {
        self.rebuild(account).await
    }

    async fn recently_active(&self, lookback: Duration, cap: i64) -> Result<Vec<String>> {
        use futures_util::TryStreamExt;

        let cutoff = DateTime::from_millis(
            DateTime::now().timestamp_millis() - lookback.as_millis() as i64,
        );

        let views: Vec<LiveViewDoc> = self
            .live_views
            .inner()
            .find(doc! { "metadata.updated_at": { "$gte": cutoff } })
            .sort(doc! { "metadata.updated_at": -1 })
            .limit(cap)
            .await
            .map_err(|e| crate::types::LapidaryError::Database(format!("Find failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| crate::types::LapidaryError::Database(format!("Cursor failed: {}", e)))?;

        let accounts: Vec<String> = views.into_iter().map(|v| v.account).collect();
        info!(count = accounts.len(), "recent-activity fanout query");
        Ok(accounts)
    }
}

/// Derive the live view from gathered sources
///
/// Returns the composed document and the entries dropped by the
/// unlocked-count filter so the caller can audit them.
pub fn compose(
    account: &str,
    sources: &AggregateSources,
    rebuilt_at: DateTime,
) -> (LiveViewDoc, Vec<DroppedEntry>) {
    let default_profile = ProfileDoc::default();
    let profile = sources.profile.as_ref().unwrap_or(&default_profile);

    let unlocked = UnlockedCounts {
        mining: profile.unlocked_slots(true),
        polishing: profile.unlocked_slots(false),
    };

    let mut dropped = Vec::new();
    let mining_slots = compose_page(
        Page::Mining,
        sources.staking.page(Page::Mining),
        &sources.mining_jobs,
        unlocked.mining,
        &mut dropped,
    );
    let polishing_slots = compose_page(
        Page::Polishing,
        sources.staking.page(Page::Polishing),
        &sources.polishing_jobs,
        unlocked.polishing,
        &mut dropped,
    );

    let city = profile.city.clone();
    let city_boost = match (&city, &sources.city_boosts) {
        (Some(city), Some(boosts)) => boosts.boost_for(city),
        _ => 0.0,
    };

    let view = LiveViewDoc {
        _id: None,
        metadata: Default::default(),
        account: account.to_string(),
        display_name: profile.display_name.clone(),
        city,
        city_boost,
        price: sources.pricing.as_ref().map(|p| p.current_price),
        balances: sources
            .ledger
            .as_ref()
            .map(|l| l.balances.clone())
            .unwrap_or_default(),
        unlocked,
        mining_slots,
        polishing_slots,
        speedboost_inventory: sources
            .inventory
            .as_ref()
            .map(|i| i.speedboosts.clone())
            .unwrap_or_default(),
        rebuilt_at,
    };

    (view, dropped)
}

/// Merge one page's staking occupancy with its active jobs
fn compose_page(
    page: Page,
    slots: &BTreeMap<String, SlotEntry>,
    jobs: &[JobDoc],
    unlocked: u32,
    dropped: &mut Vec<DroppedEntry>,
) -> Vec<SlotView> {
    let mut views: BTreeMap<u32, SlotView> = BTreeMap::new();

    for (key, entry) in slots {
        let Some(slot_num) = parse_slot_key(key) else {
            dropped.push(DroppedEntry {
                page,
                slot_num: 0,
                reason: "unparseable slot key",
            });
            continue;
        };
        if slot_num > unlocked {
            dropped.push(DroppedEntry {
                page,
                slot_num,
                reason: "staked beyond unlocked count",
            });
            continue;
        }
        views.insert(slot_num, slot_view_from_entry(page, slot_num, entry));
    }

    for job in jobs {
        if job.slot_num > unlocked {
            dropped.push(DroppedEntry {
                page,
                slot_num: job.slot_num,
                reason: "job beyond unlocked count",
            });
            continue;
        }
        // Orphan repair: a job without staking still gets a minimal view
        let view = views
            .entry(job.slot_num)
            .or_insert_with(|| SlotView::idle(job.slot_num));
        view.state = SlotState::Active;
        view.job_id = Some(job.job_id.clone());
        view.started_at = Some(job.started_at);
        view.finish_at = Some(job.finish_at);
        view.job_power = job.computed_power;
        view.amount_in = job.amount_in;
    }

    // An unlocked page never renders empty
    if views.is_empty() && unlocked >= 1 {
        views.insert(1, SlotView::idle(1));
    }

    views.into_values().collect()
}

fn slot_view_from_entry(page: Page, slot_num: u32, entry: &SlotEntry) -> SlotView {
    let mut view = SlotView::idle(slot_num);
    view.power = entry.total_power();
    view.workers = entry.workers.len() as u32;
    view.boost = entry
        .speedboost
        .as_ref()
        .map(|s| s.attributes.boost())
        .unwrap_or(0.0);
    view.base_asset = match page {
        Page::Mining => entry.mine.as_ref().map(|a| a.asset_id.clone()),
        Page::Polishing => entry.table.as_ref().map(|a| a.asset_id.clone()),
    };
    if let Some(ref gem) = entry.gem {
        if let RoleAttributes::Gem {
            ref gem_type,
            bonus,
            ..
        } = gem.attributes
        {
            view.gem_type = Some(gem_type.clone());
            view.gem_bonus = bonus;
        }
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StakedAsset;
    use crate::db::schemas::{slot_key, JobStatus, Metadata};

    fn staked(id: &str, attributes: RoleAttributes) -> StakedAsset {
        StakedAsset {
            asset_id: id.to_string(),
            template_id: "100001".to_string(),
            attributes,
        }
    }

    fn job(page: Page, slot_num: u32, id: &str) -> JobDoc {
        JobDoc {
            _id: None,
            metadata: Metadata::default(),
            job_id: id.to_string(),
            account: "alice".to_string(),
            page,
            slot_num,
            started_at: DateTime::from_millis(1_000),
            finish_at: DateTime::from_millis(2_000),
            status: JobStatus::Active,
            input_assets: vec![],
            computed_power: Some(150),
            amount_in: None,
        }
    }

    fn sources_with_staking(staking: StakingRecordDoc) -> AggregateSources {
        AggregateSources {
            staking,
            ..AggregateSources::default()
        }
    }

    #[test]
    fn empty_account_gets_one_idle_slot_per_page() {
        let sources = sources_with_staking(StakingRecordDoc::empty("alice"));
        let (view, dropped) = compose("alice", &sources, DateTime::from_millis(0));

        assert!(dropped.is_empty());
        assert_eq!(view.unlocked.mining, 1);
        assert_eq!(view.mining_slots, vec![SlotView::idle(1)]);
        assert_eq!(view.polishing_slots, vec![SlotView::idle(1)]);
    }

    #[test]
    fn staking_beyond_unlocked_count_is_dropped() {
        let mut staking = StakingRecordDoc::empty("alice");
        staking
            .mining
            .entry(slot_key(1))
            .or_default()
            .mine = Some(staked("m-1", RoleAttributes::Mine { power: 100 }));
        staking
            .mining
            .entry(slot_key(5))
            .or_default()
            .mine = Some(staked("m-5", RoleAttributes::Mine { power: 100 }));

        let sources = sources_with_staking(staking);
        let (view, dropped) = compose("alice", &sources, DateTime::from_millis(0));

        // Default unlocked count is 1; slot 5 must not leak into the view
        assert_eq!(view.mining_slots.len(), 1);
        assert_eq!(view.mining_slots[0].slot_num, 1);
        assert_eq!(
            dropped,
            vec![DroppedEntry {
                page: Page::Mining,
                slot_num: 5,
                reason: "staked beyond unlocked count",
            }]
        );
    }

    #[test]
    fn job_merges_into_staked_slot() {
        let mut staking = StakingRecordDoc::empty("alice");
        let entry = staking.mining.entry(slot_key(1)).or_default();
        entry.mine = Some(staked("m-1", RoleAttributes::Mine { power: 100 }));
        entry.workers.push(staked("w-1", RoleAttributes::Worker { power: 50 }));

        let mut sources = sources_with_staking(staking);
        sources.mining_jobs.push(job(Page::Mining, 1, "j-1"));

        let (view, dropped) = compose("alice", &sources, DateTime::from_millis(0));
        assert!(dropped.is_empty());

        let slot = &view.mining_slots[0];
        assert_eq!(slot.state, SlotState::Active);
        assert_eq!(slot.power, 150);
        assert_eq!(slot.workers, 1);
        assert_eq!(slot.job_id.as_deref(), Some("j-1"));
        assert_eq!(slot.job_power, Some(150));
    }

    #[test]
    fn orphan_job_yields_fallback_slot_view() {
        let mut sources = sources_with_staking(StakingRecordDoc::empty("alice"));
        sources.profile = Some(ProfileDoc {
            account: "alice".to_string(),
            mining_slots: Some(3),
            ..ProfileDoc::default()
        });
        sources.mining_jobs.push(job(Page::Mining, 2, "j-9"));

        let (view, dropped) = compose("alice", &sources, DateTime::from_millis(0));
        assert!(dropped.is_empty());

        let slot = view
            .mining_slots
            .iter()
            .find(|s| s.slot_num == 2)
            .expect("orphan job slot present");
        assert_eq!(slot.state, SlotState::Active);
        assert_eq!(slot.power, 0);
        assert_eq!(slot.job_id.as_deref(), Some("j-9"));
    }

    #[test]
    fn job_beyond_unlocked_count_is_dropped() {
        let mut sources = sources_with_staking(StakingRecordDoc::empty("alice"));
        sources.mining_jobs.push(job(Page::Mining, 4, "j-4"));

        let (view, dropped) = compose("alice", &sources, DateTime::from_millis(0));
        assert!(view.mining_slots.iter().all(|s| s.slot_num != 4));
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].reason, "job beyond unlocked count");
    }

    #[test]
    fn override_beats_profile_counter() {
        let mut sources = sources_with_staking(StakingRecordDoc::empty("alice"));
        sources.profile = Some(ProfileDoc {
            account: "alice".to_string(),
            mining_slots: Some(2),
            mining_slots_override: Some(6),
            ..ProfileDoc::default()
        });

        let (view, _) = compose("alice", &sources, DateTime::from_millis(0));
        assert_eq!(view.unlocked.mining, 6);
    }

    #[test]
    fn balances_price_and_city_boost_pass_through() {
        let mut sources = sources_with_staking(StakingRecordDoc::empty("alice"));
        sources.ledger = Some(LedgerDoc {
            account: "alice".to_string(),
            balances: std::collections::HashMap::from([("rough".to_string(), 42)]),
            ..LedgerDoc::default()
        });
        sources.pricing = Some(PricingDoc {
            key: PRICING_ID.to_string(),
            current_price: 1.75,
            ..PricingDoc::default()
        });
        sources.profile = Some(ProfileDoc {
            account: "alice".to_string(),
            city: Some("keystone".to_string()),
            ..ProfileDoc::default()
        });
        sources.city_boosts = Some(CityBoostDoc {
            key: CITY_BOOSTS_ID.to_string(),
            boosts: std::collections::HashMap::from([("keystone".to_string(), 0.15)]),
            ..CityBoostDoc::default()
        });

        let (view, _) = compose("alice", &sources, DateTime::from_millis(0));
        assert_eq!(view.balances.get("rough"), Some(&42));
        assert_eq!(view.price, Some(1.75));
        assert!((view.city_boost - 0.15).abs() < 1e-9);
    }

    #[test]
    fn gem_and_boost_surface_in_slot_view() {
        let mut staking = StakingRecordDoc::empty("alice");
        let entry = staking.polishing.entry(slot_key(1)).or_default();
        entry.table = Some(staked("t-1", RoleAttributes::Table { power: 60 }));
        entry.gem = Some(staked(
            "g-1",
            RoleAttributes::Gem {
                gem_type: "ruby".to_string(),
                polished: true,
                bonus: 0.08,
            },
        ));
        entry.speedboost = Some(staked(
            "sb-1",
            RoleAttributes::Speedboost {
                boost: 0.25,
                multiplier: 1.25,
            },
        ));

        let sources = sources_with_staking(staking);
        let (view, _) = compose("alice", &sources, DateTime::from_millis(0));

        let slot = &view.polishing_slots[0];
        assert_eq!(slot.base_asset.as_deref(), Some("t-1"));
        assert_eq!(slot.gem_type.as_deref(), Some("ruby"));
        assert!((slot.gem_bonus - 0.08).abs() < 1e-9);
        assert!((slot.boost - 0.25).abs() < 1e-9);
    }
}
