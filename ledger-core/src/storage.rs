//! Storage capabilities consumed by the core
//!
//! The balance service and the splitter only ever see these traits. Concrete
//! backends (Postgres, Redis, in-memory) live behind them.

use crate::error::Result;
use crate::types::{
    Amount, BalanceMap, CacheLookup, DeltaOutcome, Group, GroupId, LoanRecord, NewLoan, UserId,
};
use async_trait::async_trait;

/// Durable, append-only loan log
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a batch of loans atomically, assigning IDs and timestamps
    ///
    /// Either every loan of the batch is visible to readers afterwards or
    /// none is.
    async fn append(&self, loans: &[NewLoan]) -> Result<Vec<LoanRecord>>;

    /// Aggregate a user's net balance toward every counterparty
    ///
    /// Loans where the user is lender count positive toward the debtor,
    /// loans where the user is debtor count negative toward the lender.
    async fn compute_balance(&self, user: UserId) -> Result<BalanceMap>;
}

/// Disposable per-user balance cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether a populated entry exists for the user
    async fn exists(&self, user: UserId) -> Result<bool>;

    /// Read the cached balance
    ///
    /// Undecodable entries are cleared and reported as
    /// [`CacheLookup::NotCached`], never as an error.
    async fn get(&self, user: UserId) -> Result<CacheLookup>;

    /// Replace the user's entry with `balance` and mark it populated
    async fn populate(&self, user: UserId, balance: &BalanceMap) -> Result<()>;

    /// Add deltas to the user's counterparties
    ///
    /// All deltas commit together or not at all. When the entry is not
    /// populated nothing is written and [`DeltaOutcome::Skipped`] is returned.
    async fn apply_delta(&self, user: UserId, deltas: &[(UserId, Amount)]) -> Result<DeltaOutcome>;

    /// Drop the user's entry, forcing repopulation on next read
    async fn clear(&self, user: UserId) -> Result<()>;
}

/// Group and membership storage
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Create a group owned by `owner`
    async fn create_group(&self, name: &str, owner: UserId) -> Result<Group>;

    /// Look up a group
    async fn group_by_id(&self, group: GroupId) -> Result<Option<Group>>;

    /// Delete a group and its memberships; returns whether it existed
    async fn delete_group(&self, group: GroupId) -> Result<bool>;

    /// Add members, ignoring ones already present
    async fn add_members(&self, group: GroupId, members: &[UserId]) -> Result<()>;

    /// Remove a member; returns whether the membership existed
    async fn remove_member(&self, group: GroupId, member: UserId) -> Result<bool>;

    /// Members of a group, owner excluded
    async fn members(&self, group: GroupId) -> Result<Vec<UserId>>;

    /// Groups where the user is owner or member
    async fn groups_by_user(&self, user: UserId) -> Result<Vec<Group>>;
}
