//! RebuildScheduler
//!
//! Per-account debounce over live-view rebuilds. Every qualifying write
//! replaces the account's pending timer; only the timer that survives the
//! quiet window fires, so a burst of writes costs one rebuild. Callers never
//! wait on the rebuild itself.
//!
//! Global-document writes fan out to accounts seen recently, capped, rather
//! than rebuilding every account in the system.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::live::aggregator::Rebuilder;

/// Which source document changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    Profile,
    Ledger,
    Staking,
    Job,
    InventorySummary,
    /// Fanned out from a global-document write
    Global,
}

/// The two global documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalDoc {
    Pricing,
    CityBoosts,
}

struct Pending {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    rebuilder: Arc<dyn Rebuilder>,
    window: Duration,
    lookback: Duration,
    fanout_cap: i64,
    pending: DashMap<String, Pending>,
    generation: AtomicU64,
}

/// Debounced rebuild dispatch, one cancellable delayed task per account
#[derive(Clone)]
pub struct RebuildScheduler {
    inner: Arc<Inner>,
}

impl RebuildScheduler {
    pub fn new(
        rebuilder: Arc<dyn Rebuilder>,
        window: Duration,
        lookback: Duration,
        fanout_cap: i64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                rebuilder,
                window,
                lookback,
                fanout_cap,
                pending: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Note a qualifying write; replaces any pending timer for the account
    pub fn note_write(&self, account: &str, source: WriteSource) {
        let inner = &self.inner;
        let generation = inner.generation.fetch_add(1, Ordering::Relaxed);
        debug!(account = %account, ?source, generation, "rebuild trigger");

        // Register the new generation first so the old timer is dead the
        // moment it is replaced
        if let Some(old) = inner.pending.insert(
            account.to_string(),
            Pending {
                generation,
                handle: None,
            },
        ) {
            if let Some(handle) = old.handle {
                handle.abort();
            }
        }

        let task_inner = Arc::clone(inner);
        let account_owned = account.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(task_inner.window).await;

            // Only the surviving generation fires
            let won = task_inner
                .pending
                .remove_if(&account_owned, |_, p| p.generation == generation)
                .is_some();
            if !won {
                return;
            }

            if let Err(e) = task_inner.rebuilder.rebuild_account(&account_owned).await {
                warn!(account = %account_owned, "live view rebuild failed: {}", e);
            }
        });

        if let Some(mut entry) = inner.pending.get_mut(account) {
            if entry.generation == generation {
                entry.handle = Some(handle);
            } else {
                // Replaced before we could attach the handle
                handle.abort();
            }
        }
    }

    /// Fan a global-document write out to recently-active accounts
    pub async fn note_global_write(&self, doc: GlobalDoc) {
        match self
            .inner
            .rebuilder
            .recently_active(self.inner.lookback, self.inner.fanout_cap)
            .await
        {
            Ok(accounts) => {
                info!(?doc, count = accounts.len(), "global write fanout");
                for account in accounts {
                    self.note_write(&account, WriteSource::Global);
                }
            }
            Err(e) => {
                warn!(?doc, "global fanout query failed: {}", e);
            }
        }
    }

    /// Pending timers, for introspection
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingRebuilder {
        rebuilds: AtomicUsize,
        active: Vec<String>,
    }

    impl CountingRebuilder {
        fn new(active: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                rebuilds: AtomicUsize::new(0),
                active,
            })
        }

        fn count(&self) -> usize {
            self.rebuilds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Rebuilder for CountingRebuilder {
        async fn rebuild_account(&self, _account: &str) -> Result<()> {
            self.rebuilds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn recently_active(&self, _lookback: Duration, cap: i64) -> Result<Vec<String>> {
            Ok(self.active.iter().take(cap as usize).cloned().collect())
        }
    }

    fn scheduler_with(rebuilder: Arc<CountingRebuilder>) -> RebuildScheduler {
        RebuildScheduler::new(
            rebuilder,
            Duration::from_millis(100),
            Duration::from_secs(900),
            10,
        )
    }

    async fn settle(window: Duration) {
        // Paused clocks auto-advance; a couple of extra yields let the
        // spawned timers run to completion
        tokio::time::sleep(window * 3).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_writes_fires_one_rebuild() {
        let rebuilder = CountingRebuilder::new(vec![]);
        let scheduler = scheduler_with(Arc::clone(&rebuilder));

        for _ in 0..5 {
            scheduler.note_write("alice", WriteSource::Staking);
        }
        assert_eq!(scheduler.pending_count(), 1);

        settle(Duration::from_millis(100)).await;
        assert_eq!(rebuilder.count(), 1);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_accounts_debounce_independently() {
        let rebuilder = CountingRebuilder::new(vec![]);
        let scheduler = scheduler_with(Arc::clone(&rebuilder));

        scheduler.note_write("alice", WriteSource::Ledger);
        scheduler.note_write("bob", WriteSource::Job);
        scheduler.note_write("alice", WriteSource::Job);

        settle(Duration::from_millis(100)).await;
        assert_eq!(rebuilder.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_periods_fire_again() {
        let rebuilder = CountingRebuilder::new(vec![]);
        let scheduler = scheduler_with(Arc::clone(&rebuilder));

        scheduler.note_write("alice", WriteSource::Staking);
        settle(Duration::from_millis(100)).await;
        assert_eq!(rebuilder.count(), 1);

        scheduler.note_write("alice", WriteSource::Staking);
        settle(Duration::from_millis(100)).await;
        assert_eq!(rebuilder.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn global_write_fans_out_capped() {
        let accounts: Vec<String> = (0..20).map(|i| format!("acct-{}", i)).collect();
        let rebuilder = CountingRebuilder::new(accounts);
        let scheduler = scheduler_with(Arc::clone(&rebuilder));

        scheduler.note_global_write(GlobalDoc::Pricing).await;
        assert_eq!(scheduler.pending_count(), 10);

        settle(Duration::from_millis(100)).await;
        assert_eq!(rebuilder.count(), 10);
    }
}
