//! In-memory storage backends
//!
//! Used by tests and local runs. The cache mirrors the Redis layout from
//! [`crate::codec`] (raw string fields plus a populated marker) so corruption
//! and partial failures can be reproduced exactly. Every backend supports
//! fault injection.

use crate::codec::{balance_key, cached_key, decode_fields};
use crate::error::{Error, Result};
use crate::storage::{CacheStore, GroupStore, LedgerStore};
use crate::types::{
    Amount, BalanceMap, CacheLookup, DeltaOutcome, Group, GroupId, LoanRecord, NewLoan, UserId,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::warn;
use uuid::Uuid;

// =========================================================================
// LEDGER
// =========================================================================

/// Append-only loan log held in memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<LoanRecord>>,
    scans: AtomicU64,
    failing: AtomicBool,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a storage error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of balance aggregations executed so far
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }

    /// All records in append order
    pub fn records(&self) -> Vec<LoanRecord> {
        self.records.read().clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage("ledger unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn append(&self, loans: &[NewLoan]) -> Result<Vec<LoanRecord>> {
        self.check_available()?;
        for loan in loans {
            loan.validate()?;
        }

        let created_at = Utc::now();
        let batch: Vec<LoanRecord> = loans
            .iter()
            .map(|loan| LoanRecord {
                id: Uuid::now_v7(),
                lender: loan.lender,
                debtor: loan.debtor,
                amount: loan.amount,
                created_at,
            })
            .collect();

        self.records.write().extend(batch.iter().cloned());
        Ok(batch)
    }

    async fn compute_balance(&self, user: UserId) -> Result<BalanceMap> {
        self.check_available()?;
        self.scans.fetch_add(1, Ordering::SeqCst);

        let records = self.records.read();
        let mut balance = BalanceMap::new();
        for (counterparty, amount) in records.iter().filter_map(|r| r.contribution(user)) {
            let net = balance.entry(counterparty).or_insert(0);
            *net = net.checked_add(amount).ok_or_else(|| {
                Error::Storage(format!(
                    "balance of user {} toward {} overflows",
                    user, counterparty
                ))
            })?;
        }
        Ok(balance)
    }
}

// =========================================================================
// BALANCE CACHE
// =========================================================================

#[derive(Debug, Default)]
struct CacheState {
    hashes: HashMap<String, HashMap<String, String>>,
    markers: HashSet<String>,
}

impl CacheState {
    fn remove(&mut self, user: UserId) {
        self.hashes.remove(&balance_key(user));
        self.markers.remove(&cached_key(user));
    }
}

/// Key-value balance cache held in memory
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: Mutex<CacheState>,
    failing: AtomicBool,
    failing_updates: AtomicBool,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a cache error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only incremental updates fail
    pub fn set_failing_updates(&self, failing: bool) {
        self.failing_updates.store(failing, Ordering::SeqCst);
    }

    /// Overwrite a raw hash field, bypassing encoding
    pub fn insert_raw(&self, user: UserId, field: &str, value: &str) {
        self.state
            .lock()
            .hashes
            .entry(balance_key(user))
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    /// Raw hash fields stored for a user
    pub fn raw_fields(&self, user: UserId) -> Option<HashMap<String, String>> {
        self.state.lock().hashes.get(&balance_key(user)).cloned()
    }

    /// Whether the populated marker is set
    pub fn is_marked(&self, user: UserId) -> bool {
        self.state.lock().markers.contains(&cached_key(user))
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Cache("cache unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn exists(&self, user: UserId) -> Result<bool> {
        self.check_available()?;
        Ok(self.is_marked(user))
    }

    async fn get(&self, user: UserId) -> Result<CacheLookup> {
        self.check_available()?;
        let mut state = self.state.lock();

        if !state.markers.contains(&cached_key(user)) {
            return Ok(CacheLookup::NotCached);
        }

        let decoded = match state.hashes.get(&balance_key(user)) {
            Some(fields) => decode_fields(fields),
            None => Ok(BalanceMap::new()),
        };

        match decoded {
            Ok(balance) => Ok(CacheLookup::Hit(balance)),
            Err(e) => {
                warn!(user_id = %user, error = %e, "Dropping corrupted balance cache");
                state.remove(user);
                Ok(CacheLookup::NotCached)
            }
        }
    }

    async fn populate(&self, user: UserId, balance: &BalanceMap) -> Result<()> {
        self.check_available()?;
        let fields: HashMap<String, String> = balance
            .iter()
            .map(|(counterparty, amount)| (counterparty.to_string(), amount.to_string()))
            .collect();

        let mut state = self.state.lock();
        state.remove(user);
        if !fields.is_empty() {
            state.hashes.insert(balance_key(user), fields);
        }
        state.markers.insert(cached_key(user));
        Ok(())
    }

    async fn apply_delta(&self, user: UserId, deltas: &[(UserId, Amount)]) -> Result<DeltaOutcome> {
        self.check_available()?;
        if self.failing_updates.load(Ordering::SeqCst) {
            return Err(Error::Cache("delta commit failed".to_string()));
        }

        let mut state = self.state.lock();
        if !state.markers.contains(&cached_key(user)) {
            return Ok(DeltaOutcome::Skipped);
        }

        let hash = state.hashes.entry(balance_key(user)).or_default();

        // Compute every new value first so a bad field leaves the hash untouched.
        let mut updated = Vec::with_capacity(deltas.len());
        let mut pending: HashMap<String, Amount> = HashMap::new();
        for (counterparty, delta) in deltas {
            let field = counterparty.to_string();
            let current = match pending.get(&field) {
                Some(value) => *value,
                None => match hash.get(&field) {
                    Some(raw) => raw.parse::<Amount>().map_err(|e| {
                        Error::Corrupted(format!("field {} is not an integer: {}", field, e))
                    })?,
                    None => 0,
                },
            };
            let next = current
                .checked_add(*delta)
                .ok_or_else(|| Error::Cache(format!("balance overflow for field {}", field)))?;
            pending.insert(field.clone(), next);
            updated.push(field);
        }

        for field in updated {
            if let Some(value) = pending.get(&field) {
                hash.insert(field, value.to_string());
            }
        }

        Ok(DeltaOutcome::Applied)
    }

    async fn clear(&self, user: UserId) -> Result<()> {
        self.check_available()?;
        self.state.lock().remove(user);
        Ok(())
    }
}

// =========================================================================
// GROUPS
// =========================================================================

#[derive(Debug, Clone)]
struct GroupEntry {
    group: Group,
    members: BTreeSet<UserId>,
}

/// Group directory held in memory
#[derive(Debug, Default)]
pub struct MemoryGroups {
    groups: DashMap<GroupId, GroupEntry>,
    failing: AtomicBool,
}

impl MemoryGroups {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a storage error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage("group store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MemoryGroups {
    async fn create_group(&self, name: &str, owner: UserId) -> Result<Group> {
        self.check_available()?;
        let group = Group {
            id: GroupId::new(),
            name: name.to_string(),
            owner_id: owner,
            created_at: Utc::now(),
        };

        self.groups.insert(
            group.id,
            GroupEntry {
                group: group.clone(),
                members: BTreeSet::new(),
            },
        );
        Ok(group)
    }

    async fn group_by_id(&self, group: GroupId) -> Result<Option<Group>> {
        self.check_available()?;
        Ok(self.groups.get(&group).map(|entry| entry.group.clone()))
    }

    async fn delete_group(&self, group: GroupId) -> Result<bool> {
        self.check_available()?;
        Ok(self.groups.remove(&group).is_some())
    }

    async fn add_members(&self, group: GroupId, members: &[UserId]) -> Result<()> {
        self.check_available()?;
        let mut entry = self
            .groups
            .get_mut(&group)
            .ok_or_else(|| Error::NotFound(format!("group {} not found", group)))?;
        entry.members.extend(members.iter().copied());
        Ok(())
    }

    async fn remove_member(&self, group: GroupId, member: UserId) -> Result<bool> {
        self.check_available()?;
        Ok(self
            .groups
            .get_mut(&group)
            .map(|mut entry| entry.members.remove(&member))
            .unwrap_or(false))
    }

    async fn members(&self, group: GroupId) -> Result<Vec<UserId>> {
        self.check_available()?;
        Ok(self
            .groups
            .get(&group)
            .map(|entry| entry.members.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn groups_by_user(&self, user: UserId) -> Result<Vec<Group>> {
        self.check_available()?;
        let mut groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|entry| entry.group.owner_id == user || entry.members.contains(&user))
            .map(|entry| entry.group.clone())
            .collect();
        groups.sort_by_key(|g| g.created_at);
        Ok(groups)
    }
}
