//! Splitledger Ledger Core
//!
//! Append-only loan ledger with a lazily-populated, self-healing balance cache.
//!
//! # Architecture
//!
//! - **Loan Ledger**: immutable debt records, the only source of truth
//! - **Balance Cache**: per-user counterparty → net amount map, disposable
//! - **Balance Service**: read-through population and incremental delta updates
//! - **Expense Splitter**: turns a group expense into one loan per debtor
//!
//! # Invariants
//!
//! - Antisymmetry: balance(A, B) == -balance(B, A)
//! - Equivalence: a served balance always equals the ledger aggregation
//! - Append-only: loans are never modified or deleted
//! - Cache failures are never surfaced to callers

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod balance;
pub mod codec;
pub mod config;
pub mod error;
pub mod groups;
pub mod memory;
pub mod metrics;
pub mod splitter;
pub mod storage;
pub mod types;

// Re-exports
pub use balance::BalanceService;
pub use config::Config;
pub use error::{Error, Result};
pub use groups::GroupService;
pub use splitter::{split_share, ExpenseSplitter};
pub use storage::{CacheStore, GroupStore, LedgerStore};
pub use types::{
    Amount, BalanceEntry, BalanceMap, CacheLookup, DeltaOutcome, ExpenseSplit, Group, GroupId,
    GroupInfo, LoanRecord, NewLoan, UserId, MAX_AMOUNT,
};
