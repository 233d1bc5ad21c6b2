//! Balance cache layout
//!
//! A user's cached balance is stored as a hash at `balance:<user>` mapping
//! counterparty ID to a decimal amount, plus a marker key `cached:<user>`.
//! The marker tells an empty-but-computed balance apart from one that was
//! never computed, since most stores drop empty hashes.

use crate::error::{Error, Result};
use crate::types::{Amount, BalanceMap, UserId};
use std::collections::HashMap;

/// Cache key prefixes
pub mod keys {
    /// Hash of counterparty → net amount
    pub const BALANCE: &str = "balance";

    /// Populated marker
    pub const CACHED: &str = "cached";
}

/// Key of the balance hash for a user
pub fn balance_key(user: UserId) -> String {
    format!("{}:{}", keys::BALANCE, user)
}

/// Key of the populated marker for a user
pub fn cached_key(user: UserId) -> String {
    format!("{}:{}", keys::CACHED, user)
}

/// Encode a balance map into hash fields
pub fn encode_fields(balance: &BalanceMap) -> Vec<(String, Amount)> {
    balance
        .iter()
        .map(|(counterparty, amount)| (counterparty.to_string(), *amount))
        .collect()
}

/// Decode hash fields into a balance map
///
/// Any unparsable counterparty or amount yields [`Error::Corrupted`].
pub fn decode_fields(fields: &HashMap<String, String>) -> Result<BalanceMap> {
    let mut balance = BalanceMap::with_capacity(fields.len());
    for (field, value) in fields {
        let counterparty: UserId = field.parse().map_err(|e| {
            Error::Corrupted(format!("invalid counterparty ID {:?}: {}", field, e))
        })?;

        let amount: Amount = value.trim().parse().map_err(|e| {
            Error::Corrupted(format!(
                "invalid balance {:?} for counterparty {}: {}",
                value, counterparty, e
            ))
        })?;

        balance.insert(counterparty, amount);
    }

    Ok(balance)
}
