//! Property-based tests for balance invariants
//!
//! These tests use proptest to verify:
//! - Antisymmetry: balance(A, B) == -balance(B, A)
//! - Ledger-cache equivalence: served balances equal the ledger aggregation
//!   whatever the cache went through (cold, populated, cleared, corrupted)
//! - Idempotent population: repeated reads never rescan the ledger

use ledger_core::{
    memory::{MemoryCache, MemoryLedger},
    BalanceService, CacheStore, Config, LedgerStore, UserId,
};
use proptest::prelude::*;
use std::sync::Arc;

const USERS: usize = 4;

/// One step applied to the system under test
#[derive(Debug, Clone)]
enum Op {
    /// Lender lends `amount` to every user selected by `debtor_mask`
    Loan {
        lender: usize,
        debtor_mask: u8,
        amount: i64,
    },
    /// Read a balance (populates the cache)
    Read(usize),
    /// Drop a user's cache entry
    Clear(usize),
    /// Write an unparsable value into a user's cache entry
    Corrupt { user: usize, counterparty: usize },
}

/// Strategy for generating loan amounts in cents
fn amount_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000i64
}

/// Strategy for generating operations
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..USERS, 1u8..16u8, amount_strategy()).prop_map(|(lender, debtor_mask, amount)| Op::Loan {
            lender,
            debtor_mask,
            amount,
        }),
        3 => (0..USERS).prop_map(Op::Read),
        1 => (0..USERS).prop_map(Op::Clear),
        1 => (0..USERS, 0..USERS).prop_map(|(user, counterparty)| Op::Corrupt { user, counterparty }),
    ]
}

struct System {
    users: Vec<UserId>,
    ledger: Arc<MemoryLedger>,
    cache: Arc<MemoryCache>,
    service: BalanceService,
}

fn create_system() -> System {
    let ledger = Arc::new(MemoryLedger::new());
    let cache = Arc::new(MemoryCache::new());
    let service = BalanceService::new(ledger.clone(), cache.clone(), Config::default());
    System {
        users: (0..USERS).map(|_| UserId::new()).collect(),
        ledger,
        cache,
        service,
    }
}

async fn apply(system: &System, op: &Op) {
    match op {
        Op::Loan {
            lender,
            debtor_mask,
            amount,
        } => {
            let lender_id = system.users[*lender];
            let debtors: Vec<UserId> = (0..USERS)
                .filter(|&i| i != *lender && (*debtor_mask >> i) & 1 == 1)
                .map(|i| system.users[i])
                .collect();
            if !debtors.is_empty() {
                system
                    .service
                    .add_loan(lender_id, *amount, &debtors)
                    .await
                    .unwrap();
            }
        }
        Op::Read(user) => {
            system.service.get_balance(system.users[*user]).await.unwrap();
        }
        Op::Clear(user) => {
            system.cache.clear(system.users[*user]).await.unwrap();
        }
        Op::Corrupt { user, counterparty } => {
            system.cache.insert_raw(
                system.users[*user],
                &system.users[*counterparty].to_string(),
                "not-a-number",
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: served balances always match the ledger aggregation
    #[test]
    fn prop_cache_matches_ledger(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let system = create_system();
            for op in &ops {
                apply(&system, op).await;
            }

            for user in &system.users {
                let served = system.service.get_balance(*user).await.unwrap();
                let expected = system.ledger.compute_balance(*user).await.unwrap();
                prop_assert_eq!(served, expected);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: balance(A, B) == -balance(B, A) for every pair
    #[test]
    fn prop_antisymmetry(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let system = create_system();
            for op in &ops {
                apply(&system, op).await;
            }

            for a in &system.users {
                let balance_a = system.service.get_balance(*a).await.unwrap();
                for b in &system.users {
                    if a == b {
                        continue;
                    }
                    let balance_b = system.service.get_balance(*b).await.unwrap();
                    let ab = balance_a.get(b).copied().unwrap_or(0);
                    let ba = balance_b.get(a).copied().unwrap_or(0);
                    prop_assert_eq!(ab, -ba);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: a second read with no intervening writes is served from cache
    #[test]
    fn prop_population_is_idempotent(ops in prop::collection::vec(op_strategy(), 1..30), user in 0..USERS) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let system = create_system();
            for op in &ops {
                apply(&system, op).await;
            }

            let user = system.users[user];
            let first = system.service.get_balance(user).await.unwrap();
            let scans = system.ledger.scan_count();
            let second = system.service.get_balance(user).await.unwrap();

            prop_assert_eq!(first, second);
            prop_assert_eq!(system.ledger.scan_count(), scans);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
