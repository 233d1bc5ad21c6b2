//! HTTP API tests over the in-memory backends

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use balance_engine::{handlers, handlers::USER_ID_HEADER, metrics, AppState};
use ledger_core::memory::{MemoryCache, MemoryGroups, MemoryLedger};
use ledger_core::{BalanceMap, Group, LedgerStore, LoanRecord, NewLoan, UserId};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct Backends {
    ledger: Arc<MemoryLedger>,
    cache: Arc<MemoryCache>,
    state: web::Data<AppState>,
}

fn backends() -> Backends {
    let ledger = Arc::new(MemoryLedger::new());
    let cache = Arc::new(MemoryCache::new());
    let state = web::Data::new(AppState::new(
        ledger.clone(),
        cache.clone(),
        Arc::new(MemoryGroups::new()),
        ledger_core::Config::default(),
        Duration::from_secs(5),
    ));
    Backends {
        ledger,
        cache,
        state,
    }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(handlers::configure_routes),
        )
        .await
    };
}

fn header(user: UserId) -> (&'static str, String) {
    (USER_ID_HEADER, user.to_string())
}

fn balance_of(body: &Value) -> BalanceMap {
    body["balance"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            (
                entry["user_id"].as_str().unwrap().parse().unwrap(),
                entry["balance"].as_i64().unwrap(),
            )
        })
        .collect()
}

#[actix_web::test]
async fn test_health_check() {
    let b = backends();
    let app = app!(b.state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
}

#[actix_web::test]
async fn test_missing_or_invalid_identity_is_unauthorized() {
    let b = backends();
    let app = app!(b.state);

    let req = test::TestRequest::get().uri("/api/v1/balance").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/v1/balance")
        .insert_header((USER_ID_HEADER, "alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], 401);
    assert_eq!(body["error"]["type"], "unauthorized");
}

#[actix_web::test]
async fn test_split_then_compound() {
    let b = backends();
    let app = app!(b.state);
    let alice = UserId::new();
    let bob = UserId::new();
    let charlie = UserId::new();

    // Alice creates a group with Bob and Charlie and pays 42.00
    let req = test::TestRequest::post()
        .uri("/api/v1/groups")
        .insert_header(header(alice))
        .set_json(json!({ "name": "Friends" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let friends: Group = test::read_body_json(resp).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/groups/{}/members", friends.id))
        .insert_header(header(alice))
        .set_json(json!({ "ids": [bob, charlie] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/groups/{}/expenses", friends.id))
        .insert_header(header(alice))
        .set_json(json!({ "amount": 4200 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let split: Value = test::read_body_json(resp).await;
    assert_eq!(split["share"], 1400);
    assert_eq!(split["loans"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::get()
        .uri("/api/v1/balance")
        .insert_header(header(alice))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let expected: BalanceMap = BalanceMap::from([(bob, 1400), (charlie, 1400)]);
    assert_eq!(balance_of(&body), expected);

    // Bob's cache gets populated before the second expense
    let req = test::TestRequest::get()
        .uri("/api/v1/balance")
        .insert_header(header(bob))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(balance_of(&body), BalanceMap::from([(alice, -1400)]));
    assert!(b.cache.is_marked(bob));

    // Bob pays 8.00 for coffee with Alice
    let req = test::TestRequest::post()
        .uri("/api/v1/groups")
        .insert_header(header(alice))
        .set_json(json!({ "name": "Hot coffee" }))
        .to_request();
    let coffee: Group = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/groups/{}/members", coffee.id))
        .insert_header(header(alice))
        .set_json(json!({ "ids": [bob] }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/groups/{}/expenses", coffee.id))
        .insert_header(header(bob))
        .set_json(json!({ "amount": 800 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    for (user, expected) in [
        (alice, vec![(bob, 1000), (charlie, 1400)]),
        (bob, vec![(alice, -1000)]),
        (charlie, vec![(alice, -1400)]),
    ] {
        let req = test::TestRequest::get()
            .uri("/api/v1/balance")
            .insert_header(header(user))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let expected: BalanceMap = expected.into_iter().collect();
        assert_eq!(balance_of(&body), expected);
        assert_eq!(b.ledger.compute_balance(user).await.unwrap(), expected);
    }
}

#[actix_web::test]
async fn test_expense_rejections() {
    let b = backends();
    let app = app!(b.state);
    let alice = UserId::new();
    let bob = UserId::new();
    let mallory = UserId::new();

    let req = test::TestRequest::post()
        .uri("/api/v1/groups")
        .insert_header(header(alice))
        .set_json(json!({ "name": "Solo" }))
        .to_request();
    let group: Group = test::call_and_read_body_json(&app, req).await;
    let expenses = format!("/api/v1/groups/{}/expenses", group.id);

    // Owner alone cannot split
    let req = test::TestRequest::post()
        .uri(&expenses)
        .insert_header(header(alice))
        .set_json(json!({ "amount": 1000 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/groups/{}/members", group.id))
        .insert_header(header(alice))
        .set_json(json!({ "ids": [bob] }))
        .to_request();
    test::call_service(&app, req).await;

    // Non-member payer
    let req = test::TestRequest::post()
        .uri(&expenses)
        .insert_header(header(mallory))
        .set_json(json!({ "amount": 1000 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Non-positive amount
    let req = test::TestRequest::post()
        .uri(&expenses)
        .insert_header(header(alice))
        .set_json(json!({ "amount": 0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Oversized amount, repeated, leaves the payer's balance readable
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&expenses)
            .insert_header(header(alice))
            .set_json(json!({ "amount": i64::MAX }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/balance")
        .insert_header(header(alice))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Unknown group
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/groups/{}/expenses", uuid::Uuid::new_v4()))
        .insert_header(header(alice))
        .set_json(json!({ "amount": 1000 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    assert!(b.ledger.records().is_empty());
}

#[actix_web::test]
async fn test_group_management() {
    let b = backends();
    let app = app!(b.state);
    let alice = UserId::new();
    let bob = UserId::new();

    let req = test::TestRequest::post()
        .uri("/api/v1/groups")
        .insert_header(header(alice))
        .set_json(json!({ "name": "ab" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/v1/groups")
        .insert_header(header(alice))
        .set_json(json!({ "name": "Trip" }))
        .to_request();
    let group: Group = test::call_and_read_body_json(&app, req).await;
    let members = format!("/api/v1/groups/{}/members", group.id);

    let req = test::TestRequest::post()
        .uri(&members)
        .insert_header(header(bob))
        .set_json(json!({ "ids": [alice] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&members)
        .insert_header(header(alice))
        .set_json(json!({ "ids": [] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&members)
        .insert_header(header(alice))
        .set_json(json!({ "ids": [bob] }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri(&members)
        .insert_header(header(bob))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["members"], json!([bob]));

    let req = test::TestRequest::get()
        .uri("/api/v1/groups")
        .insert_header(header(bob))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["groups"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("{}/{}", members, bob))
        .insert_header(header(alice))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/groups/{}", group.id))
        .insert_header(header(alice))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/groups/{}", group.id))
        .insert_header(header(alice))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_cache_outage_is_invisible() {
    let b = backends();
    let app = app!(b.state);
    let alice = UserId::new();
    let bob = UserId::new();

    b.state.balances.add_loan(alice, 500, &[bob]).await.unwrap();
    b.cache.set_failing(true);

    let req = test::TestRequest::get()
        .uri("/api/v1/balance")
        .insert_header(header(bob))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(balance_of(&body), BalanceMap::from([(alice, -500)]));
}

#[actix_web::test]
async fn test_ledger_outage_is_internal_error() {
    let b = backends();
    let app = app!(b.state);

    b.ledger.set_failing(true);

    let req = test::TestRequest::get()
        .uri("/api/v1/balance")
        .insert_header(header(UserId::new()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Internal server error");
}

/// Ledger whose aggregation never finishes in time
struct StalledLedger;

#[async_trait]
impl LedgerStore for StalledLedger {
    async fn append(&self, _loans: &[NewLoan]) -> ledger_core::Result<Vec<LoanRecord>> {
        Ok(Vec::new())
    }

    async fn compute_balance(&self, _user: UserId) -> ledger_core::Result<BalanceMap> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(BalanceMap::new())
    }
}

#[actix_web::test]
async fn test_slow_request_times_out() {
    let state = web::Data::new(AppState::new(
        Arc::new(StalledLedger),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryGroups::new()),
        ledger_core::Config::default(),
        Duration::from_millis(50),
    ));
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/balance")
        .insert_header(header(UserId::new()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[actix_web::test]
async fn test_metrics_endpoint() {
    metrics::init();

    let b = backends();
    let app = app!(b.state);

    let req = test::TestRequest::get()
        .uri("/api/v1/balance")
        .insert_header(header(UserId::new()))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("balance_cache_misses"));
}
