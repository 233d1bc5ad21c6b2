use crate::errors::{BalanceEngineError, Result};
use crate::metrics;
use crate::models::{
    AddMembersRequest, BalanceResponse, CreateGroupRequest, GroupsResponse, MembersResponse,
    ShareExpenseRequest,
};
use crate::AppState;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use futures_util::future::{ready, Ready};
use ledger_core::{GroupId, UserId};
use serde_json::json;
use std::future::Future;
use tracing::warn;
use validator::Validate;

/// Header carrying the authenticated user, set by the upstream gateway
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub UserId);

impl FromRequest for Actor {
    type Error = BalanceEngineError;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let actor = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .map(Actor)
            .ok_or(BalanceEngineError::Unauthorized);

        ready(actor)
    }
}

/// Run a handler body under the request deadline and count the outcome
async fn run<F>(state: &AppState, route: &str, body: F) -> Result<HttpResponse>
where
    F: Future<Output = Result<HttpResponse>>,
{
    let result = match tokio::time::timeout(state.request_timeout, body).await {
        Ok(result) => result,
        Err(_) => {
            warn!(route, "Request timed out");
            Err(BalanceEngineError::Timeout)
        }
    };

    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status_code(),
    };
    metrics::record_request(route, status.as_u16());

    result
}

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "balance-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus metrics endpoint
pub async fn export_metrics(state: web::Data<AppState>) -> Result<HttpResponse> {
    metrics::observe_cache(&state.balances.metrics().await);

    let body = metrics::gather().map_err(|e| BalanceEngineError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

/// Balance of the caller toward every counterparty
pub async fn get_balance(state: web::Data<AppState>, actor: Actor) -> Result<HttpResponse> {
    run(&state, "get_balance", async {
        let balance = state.balances.get_balance_entries(actor.0).await?;
        Ok(HttpResponse::Ok().json(BalanceResponse {
            user_id: actor.0,
            balance,
        }))
    })
    .await
}

/// Groups the caller owns or belongs to
pub async fn list_groups(state: web::Data<AppState>, actor: Actor) -> Result<HttpResponse> {
    run(&state, "list_groups", async {
        let groups = state.groups.groups_by_user(actor.0).await?;
        Ok(HttpResponse::Ok().json(GroupsResponse { groups }))
    })
    .await
}

/// Create a group owned by the caller
pub async fn create_group(
    state: web::Data<AppState>,
    actor: Actor,
    request: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse> {
    run(&state, "create_group", async {
        request.validate()?;
        let group = state.groups.create_group(&request.name, actor.0).await?;
        Ok(HttpResponse::Created().json(group))
    })
    .await
}

/// Group with its members
pub async fn get_group(
    state: web::Data<AppState>,
    _actor: Actor,
    group_id: web::Path<GroupId>,
) -> Result<HttpResponse> {
    run(&state, "get_group", async {
        let info = state.groups.group_info(*group_id).await?;
        Ok(HttpResponse::Ok().json(info))
    })
    .await
}

pub async fn delete_group(
    state: web::Data<AppState>,
    actor: Actor,
    group_id: web::Path<GroupId>,
) -> Result<HttpResponse> {
    run(&state, "delete_group", async {
        state.groups.delete_group(actor.0, *group_id).await?;
        Ok(HttpResponse::NoContent().finish())
    })
    .await
}

pub async fn list_members(
    state: web::Data<AppState>,
    _actor: Actor,
    group_id: web::Path<GroupId>,
) -> Result<HttpResponse> {
    run(&state, "list_members", async {
        let members = state.groups.members(*group_id).await?;
        Ok(HttpResponse::Ok().json(MembersResponse { members }))
    })
    .await
}

pub async fn add_members(
    state: web::Data<AppState>,
    actor: Actor,
    group_id: web::Path<GroupId>,
    request: web::Json<AddMembersRequest>,
) -> Result<HttpResponse> {
    run(&state, "add_members", async {
        request.validate()?;
        state
            .groups
            .add_members(actor.0, *group_id, &request.ids)
            .await?;
        Ok(HttpResponse::NoContent().finish())
    })
    .await
}

pub async fn remove_member(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<(GroupId, UserId)>,
) -> Result<HttpResponse> {
    let (group_id, member) = path.into_inner();
    run(&state, "remove_member", async {
        state.groups.remove_member(actor.0, group_id, member).await?;
        Ok(HttpResponse::NoContent().finish())
    })
    .await
}

/// Split an expense paid by the caller across a group
pub async fn share_expense(
    state: web::Data<AppState>,
    actor: Actor,
    group_id: web::Path<GroupId>,
    request: web::Json<ShareExpenseRequest>,
) -> Result<HttpResponse> {
    run(&state, "share_expense", async {
        request.validate()?;
        let split = state
            .splitter
            .share_expense(actor.0, request.amount, *group_id)
            .await?;

        metrics::EXPENSES_SHARED.inc();
        metrics::LOANS_RECORDED.inc_by(split.loans.len() as u64);

        Ok(HttpResponse::Ok().json(split))
    })
    .await
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(export_metrics))
        .service(
            web::scope("/api/v1")
                .route("/balance", web::get().to(get_balance))
                .route("/groups", web::get().to(list_groups))
                .route("/groups", web::post().to(create_group))
                .route("/groups/{id}", web::get().to(get_group))
                .route("/groups/{id}", web::delete().to(delete_group))
                .route("/groups/{id}/members", web::get().to(list_members))
                .route("/groups/{id}/members", web::post().to(add_members))
                .route("/groups/{id}/members/{user}", web::delete().to(remove_member))
                .route("/groups/{id}/expenses", web::post().to(share_expense)),
        );
}
