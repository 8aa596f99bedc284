use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use super::{created, ok};
use crate::auth::Tenant;
use crate::error::ApiResult;
use crate::services::order::{CreateOrderRequest, DiscountRequest, PaymentRequest};
use crate::services::OrderService;
use crate::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_order))
        .route("/:id/payments", post(pay))
        .route("/:id/discount", post(discount))
        .route("/:id/cancel", post(cancel))
        .route("/:id/refund", post(refund))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    limit: Option<u32>,
}

fn service(state: &AppState) -> OrderService {
    OrderService::new(state.db.clone(), state.config.frontend_url.clone())
}

async fn list(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Query(q): Query<ListQuery>,
) -> ApiResult<Response> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    Ok(ok(service(&state).list(&tenant.business, limit).await?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Response> {
    let order = service(&state)
        .create(&tenant.business, &tenant.user, &req, Utc::now())
        .await?;
    Ok(created(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    Ok(ok(service(&state).get(&tenant.business, &id).await?))
}

async fn pay(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<Response> {
    let result = service(&state)
        .pay(&tenant.business, &id, &req, Utc::now())
        .await?;
    Ok(ok(result))
}

async fn discount(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
    Json(req): Json<DiscountRequest>,
) -> ApiResult<Response> {
    let order = service(&state)
        .apply_discount(&tenant.business, &id, &req, Utc::now())
        .await?;
    Ok(ok(order))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    Ok(ok(service(&state).cancel(&tenant.business, &id, Utc::now()).await?))
}

async fn refund(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    Ok(ok(service(&state).refund(&tenant.business, &id, Utc::now()).await?))
}
