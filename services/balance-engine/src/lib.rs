pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;

pub use config::Config;
pub use errors::{BalanceEngineError, Result};

use ledger_core::{BalanceService, CacheStore, ExpenseSplitter, GroupService, GroupStore, LedgerStore};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state handed to every handler
pub struct AppState {
    pub balances: Arc<BalanceService>,
    pub groups: GroupService,
    pub splitter: ExpenseSplitter,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        cache: Arc<dyn CacheStore>,
        groups: Arc<dyn GroupStore>,
        engine: ledger_core::Config,
        request_timeout: Duration,
    ) -> Self {
        let balances = Arc::new(BalanceService::new(ledger, cache, engine));
        let splitter = ExpenseSplitter::new(groups.clone(), balances.clone());

        AppState {
            balances,
            groups: GroupService::new(groups),
            splitter,
            request_timeout,
        }
    }
}
