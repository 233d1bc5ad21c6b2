//! Configuration for the balance engine core

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Balance engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deadline for one user's incremental cache update (milliseconds)
    pub cache_update_timeout_ms: u64,

    /// Deadline for populating a user's cache after a miss (milliseconds)
    pub populate_timeout_ms: u64,

    /// Expiry for populated balance entries (seconds)
    ///
    /// Bounds how long an entry left stale by a concurrent populate can live.
    /// `None` keeps entries until they are cleared.
    pub balance_ttl_secs: Option<u64>,
}

/// Default lifetime of a populated balance entry (one day)
pub const DEFAULT_BALANCE_TTL_SECS: u64 = 86_400;

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_update_timeout_ms: 500,
            populate_timeout_ms: 500,
            balance_ttl_secs: Some(DEFAULT_BALANCE_TTL_SECS),
        }
    }
}

impl Config {
    /// Incremental update deadline
    pub fn cache_update_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_update_timeout_ms)
    }

    /// Populate deadline
    pub fn populate_timeout(&self) -> Duration {
        Duration::from_millis(self.populate_timeout_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> crate::Result<()> {
        if self.cache_update_timeout_ms == 0 {
            return Err(crate::Error::BadRequest(
                "cache_update_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.populate_timeout_ms == 0 {
            return Err(crate::Error::BadRequest(
                "populate_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.balance_ttl_secs == Some(0) {
            return Err(crate::Error::BadRequest(
                "balance_ttl_secs must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}
