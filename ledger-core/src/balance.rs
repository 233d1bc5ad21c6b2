//! Balance service
//!
//! Keeps the per-user balance cache consistent with the loan ledger.
//!
//! Reads go through the cache and fall back to a full ledger aggregation on
//! a miss, populating the cache on the way out. Writes land in the ledger
//! first; only then are incremental deltas applied to the caches of every
//! affected user that already has one. Any cache problem is logged and
//! resolved by dropping the affected entry, so the next read rebuilds it
//! from the ledger.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::{CacheEvent, CacheMetrics, MetricsRecorder};
use crate::storage::{CacheStore, LedgerStore};
use crate::types::{Amount, BalanceEntry, BalanceMap, CacheLookup, DeltaOutcome, LoanRecord, NewLoan, UserId};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Ledger-backed balance service with a read-through cache
pub struct BalanceService {
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    config: Config,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for BalanceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BalanceService {
    /// Create a balance service over a ledger and a cache
    pub fn new(ledger: Arc<dyn LedgerStore>, cache: Arc<dyn CacheStore>, config: Config) -> Self {
        Self {
            ledger,
            cache,
            config,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Current cache counters
    pub async fn metrics(&self) -> CacheMetrics {
        self.metrics.snapshot().await
    }

    /// Net balance of `user` toward every counterparty
    ///
    /// Served from the cache when populated (an empty map is a valid hit).
    /// Otherwise computed from the ledger and cached best-effort; a failed
    /// population never fails the read.
    pub async fn get_balance(&self, user: UserId) -> Result<BalanceMap> {
        match self.cache.get(user).await {
            Ok(CacheLookup::Hit(balance)) => {
                self.metrics.record(CacheEvent::Hit).await;
                debug!(user_id = %user, "Balance served from cache");
                return Ok(balance);
            }
            Ok(CacheLookup::NotCached) => {
                self.metrics.record(CacheEvent::Miss).await;
                debug!(user_id = %user, "Balance not cached, computing from ledger");
            }
            Err(e) => {
                self.metrics.record(CacheEvent::Miss).await;
                warn!(user_id = %user, error = %e, "Balance cache read failed, computing from ledger");
            }
        }

        let balance = self.ledger.compute_balance(user).await?;
        self.metrics.record(CacheEvent::LedgerScan).await;

        self.populate(user, &balance).await;
        Ok(balance)
    }

    /// Balance as a list ordered by counterparty
    pub async fn get_balance_entries(&self, user: UserId) -> Result<Vec<BalanceEntry>> {
        let balance = self.get_balance(user).await?;
        Ok(BalanceEntry::from_map(&balance))
    }

    /// Record a loan of `amount` from `lender` to each of `debtors`
    ///
    /// Every debtor owes the full `amount`; splitting happens upstream. The
    /// ledger batch is written atomically; if it fails nothing else happens.
    /// Cache updates afterwards are best-effort per user.
    pub async fn add_loan(
        &self,
        lender: UserId,
        amount: Amount,
        debtors: &[UserId],
    ) -> Result<Vec<LoanRecord>> {
        if debtors.is_empty() {
            return Err(Error::BadRequest("debtor list is empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(debtors.len());
        if !debtors.iter().all(|d| seen.insert(*d)) {
            return Err(Error::BadRequest("debtor list contains duplicates".to_string()));
        }

        let loans: Vec<NewLoan> = debtors
            .iter()
            .map(|debtor| NewLoan::new(lender, *debtor, amount))
            .collect();
        for loan in &loans {
            loan.validate()?;
        }

        let records = self.ledger.append(&loans).await.map_err(|e| {
            error!(lender_id = %lender, error = %e, "Failed to save loan records");
            e
        })?;

        info!(
            lender_id = %lender,
            amount,
            debtors = debtors.len(),
            "Recorded loans"
        );

        self.commit_balance_changes(lender, amount, debtors).await;
        Ok(records)
    }

    /// Apply the deltas of a committed loan batch to every affected cache
    ///
    /// Users are updated concurrently and independently; one failure never
    /// blocks the others.
    async fn commit_balance_changes(&self, lender: UserId, amount: Amount, debtors: &[UserId]) {
        let mut updates: Vec<(UserId, Vec<(UserId, Amount)>)> = Vec::with_capacity(debtors.len() + 1);
        updates.push((lender, debtors.iter().map(|d| (*d, amount)).collect()));
        for debtor in debtors {
            updates.push((*debtor, vec![(lender, -amount)]));
        }

        join_all(
            updates
                .iter()
                .map(|(user, deltas)| self.update_user_balance(*user, deltas)),
        )
        .await;
    }

    async fn update_user_balance(&self, user: UserId, deltas: &[(UserId, Amount)]) {
        let result = match timeout(self.config.cache_update_timeout(), self.try_update(user, deltas)).await {
            Ok(result) => result,
            Err(elapsed) => Err(Error::from(elapsed)),
        };

        match result {
            Ok(DeltaOutcome::Applied) => {
                self.metrics.record(CacheEvent::DeltaUpdate).await;
                debug!(user_id = %user, fields = deltas.len(), "Updated balance cache");
            }
            Ok(DeltaOutcome::Skipped) => {
                self.metrics.record(CacheEvent::SkippedUpdate).await;
                debug!(user_id = %user, "Balance cache not populated, skip update");
            }
            Err(e) => {
                self.metrics.record(CacheEvent::UpdateFailure).await;
                error!(user_id = %user, error = %e, "Failed to update balance cache");
                self.drop_user_cache(user).await;
            }
        }
    }

    async fn try_update(&self, user: UserId, deltas: &[(UserId, Amount)]) -> Result<DeltaOutcome> {
        if !self.cache.exists(user).await? {
            return Ok(DeltaOutcome::Skipped);
        }
        self.cache.apply_delta(user, deltas).await
    }

    async fn populate(&self, user: UserId, balance: &BalanceMap) {
        let result = match timeout(self.config.populate_timeout(), self.cache.populate(user, balance)).await {
            Ok(result) => result,
            Err(elapsed) => Err(Error::from(elapsed)),
        };

        match result {
            Ok(()) => {
                self.metrics.record(CacheEvent::Populate).await;
                debug!(user_id = %user, counterparties = balance.len(), "Populated balance cache");
            }
            Err(e) => {
                self.metrics.record(CacheEvent::PopulateFailure).await;
                warn!(user_id = %user, error = %e, "Failed to populate balance cache");
                self.drop_user_cache(user).await;
            }
        }
    }

    async fn drop_user_cache(&self, user: UserId) {
        let result = match timeout(self.config.cache_update_timeout(), self.cache.clear(user)).await {
            Ok(result) => result,
            Err(elapsed) => Err(Error::from(elapsed)),
        };

        match result {
            Ok(()) => info!(user_id = %user, "Dropped user balance cache"),
            Err(e) => error!(user_id = %user, error = %e, "Failed to drop user balance cache"),
        }
    }
}
