//! The caller's own subscription.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use super::{created, ok};
use crate::auth::{AuthUser, SuperAdmin, Tenant};
use crate::error::ApiResult;
use crate::services::{LimitsService, SubscriptionService};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/subscribe", post(subscribe))
        .route("/current", get(current))
        .route("/history", get(history))
        .route("/trial-status", get(trial_status))
        .route("/limits", get(limits))
        .route("/upgrade-options", post(upgrade_options))
        .route("/upgrade", post(upgrade))
        .route("/cancel", post(cancel))
        .route("/downgrade-to-trial", post(downgrade_to_trial))
        .route("/:code/manual-activate", post(manual_activate))
}

#[derive(Debug, Deserialize)]
struct PlanChoice {
    plan_id: String,
    plan_price_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct CancelRequest {
    #[serde(default)]
    subscription_id: Option<String>,
}

fn service(state: &AppState) -> SubscriptionService {
    SubscriptionService::new(state.db.clone())
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<PlanChoice>,
) -> ApiResult<Response> {
    let subscription = service(&state)
        .subscribe(&user, &req.plan_id, &req.plan_price_id, Utc::now())
        .await?;
    Ok(created(subscription))
}

async fn current(State(state): State<Arc<AppState>>, AuthUser(user): AuthUser) -> ApiResult<Response> {
    Ok(ok(service(&state).current(&user, Utc::now()).await?))
}

async fn history(State(state): State<Arc<AppState>>, AuthUser(user): AuthUser) -> ApiResult<Response> {
    Ok(ok(service(&state).history(&user).await?))
}

async fn trial_status(State(state): State<Arc<AppState>>, AuthUser(user): AuthUser) -> ApiResult<Response> {
    Ok(ok(service(&state).trial_status(&user, Utc::now()).await?))
}

async fn limits(State(state): State<Arc<AppState>>, tenant: Tenant) -> ApiResult<Response> {
    let report = LimitsService::new(state.db.clone())
        .report(&tenant.business, Utc::now())
        .await?;
    Ok(ok(report))
}

async fn upgrade_options(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<PlanChoice>,
) -> ApiResult<Response> {
    let options = service(&state)
        .upgrade_options(&user, &req.plan_id, &req.plan_price_id, Utc::now())
        .await?;
    Ok(ok(options))
}

async fn upgrade(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<PlanChoice>,
) -> ApiResult<Response> {
    let outcome = service(&state)
        .upgrade(&user, &req.plan_id, &req.plan_price_id, Utc::now())
        .await?;
    Ok(ok(outcome))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    body: Option<Json<CancelRequest>>,
) -> ApiResult<Response> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let cancelled = service(&state)
        .cancel(&user, req.subscription_id.as_deref(), Utc::now())
        .await?;
    Ok(ok(cancelled))
}

async fn downgrade_to_trial(State(state): State<Arc<AppState>>, AuthUser(user): AuthUser) -> ApiResult<Response> {
    Ok(ok(service(&state).downgrade_to_trial(&user, Utc::now()).await?))
}

/// Operator override for payments settled outside the gateway.
async fn manual_activate(
    State(state): State<Arc<AppState>>,
    SuperAdmin(admin): SuperAdmin,
    Path(code): Path<String>,
) -> ApiResult<Response> {
    tracing::info!(admin_id = %admin.id, code = %code, "Manual subscription activation");
    let subscription = service(&state)
        .confirm_payment(&code, "manual", None, Utc::now())
        .await?;
    Ok(ok(subscription))
}
