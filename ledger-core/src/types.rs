//! Core types for the ledger
//!
//! Money is always an integer number of minor units (cents). There is no
//! such thing as half a cent, so no type here carries fractional amounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Amount of minor units in a loan or balance
pub type Amount = i64;

/// Largest amount accepted for a single loan or expense (10^12 minor units)
///
/// Keeps every balance aggregation far below `i64::MAX`.
pub const MAX_AMOUNT: Amount = 1_000_000_000_000;

/// Net balance of one user toward each counterparty
///
/// Positive values mean the counterparty owes the owner.
pub type BalanceMap = HashMap<UserId, Amount>;

/// Opaque user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Opaque group identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Generate a fresh random group ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for GroupId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Loan to be appended to the ledger (ID and timestamp not yet assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLoan {
    /// User who lent money
    pub lender: UserId,

    /// User who owes money
    pub debtor: UserId,

    /// Loan amount in minor units
    pub amount: Amount,
}

impl NewLoan {
    /// Create a new loan
    pub fn new(lender: UserId, debtor: UserId, amount: Amount) -> Self {
        Self {
            lender,
            debtor,
            amount,
        }
    }

    /// Check ledger row invariants
    pub fn validate(&self) -> crate::Result<()> {
        if self.amount <= 0 {
            return Err(crate::Error::BadRequest(format!(
                "loan amount must be positive, got {}",
                self.amount
            )));
        }

        if self.amount > MAX_AMOUNT {
            return Err(crate::Error::BadRequest(format!(
                "loan amount {} exceeds the maximum of {}",
                self.amount, MAX_AMOUNT
            )));
        }

        if self.lender == self.debtor {
            return Err(crate::Error::BadRequest(format!(
                "user {} cannot lend to themselves",
                self.lender
            )));
        }

        Ok(())
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    /// Record ID in the loan log
    pub id: Uuid,

    /// User who lent money
    pub lender: UserId,

    /// User who owes money
    pub debtor: UserId,

    /// Loan amount in minor units
    pub amount: Amount,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl LoanRecord {
    /// Signed contribution of this record to `owner`'s balance toward `counterparty`
    ///
    /// Returns `None` when the record does not involve that pair.
    pub fn contribution(&self, owner: UserId) -> Option<(UserId, Amount)> {
        if self.lender == owner {
            Some((self.debtor, self.amount))
        } else if self.debtor == owner {
            Some((self.lender, -self.amount))
        } else {
            None
        }
    }
}

/// Balance toward one counterparty, as returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    /// Counterparty ID
    pub user_id: UserId,

    /// Net amount; positive means the counterparty owes the owner
    pub balance: Amount,
}

impl BalanceEntry {
    /// Convert a balance map into a list ordered by counterparty ID
    pub fn from_map(balance: &BalanceMap) -> Vec<BalanceEntry> {
        let mut entries: Vec<BalanceEntry> = balance
            .iter()
            .map(|(user_id, balance)| BalanceEntry {
                user_id: *user_id,
                balance: *balance,
            })
            .collect();
        entries.sort_by_key(|e| e.user_id);
        entries
    }
}

/// Result of reading a user's balance from the cache
///
/// An empty `Hit` means the user genuinely has no balances; `NotCached`
/// means the balance was never computed (or was dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Populated cache entry
    Hit(BalanceMap),

    /// No populated entry
    NotCached,
}

/// Outcome of an incremental cache update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// All deltas were committed
    Applied,

    /// Cache was not populated, nothing to update
    Skipped,
}

/// Expense sharing group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group ID
    pub id: GroupId,

    /// Display name
    pub name: String,

    /// Owner; implicitly a member when splitting expenses
    pub owner_id: UserId,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Group with its members (owner excluded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group
    #[serde(flatten)]
    pub group: Group,

    /// Members other than the owner
    pub members: Vec<UserId>,
}

/// Result of splitting an expense across a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseSplit {
    /// Group the expense was shared in
    pub group_id: GroupId,

    /// Member who paid
    pub payer_id: UserId,

    /// Amount paid
    pub total_amount: Amount,

    /// Share charged to every member, payer included
    pub share: Amount,

    /// Members who now owe the payer
    pub debtors: Vec<UserId>,

    /// Ledger entries written
    pub loans: Vec<LoanRecord>,
}
