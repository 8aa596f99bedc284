//! Payroll runs. Managers only.

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
use crate::services::payroll::{GenerateAllRequest, GeneratePayrollRequest};
use crate::services::PayrollService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list))
        .route("/generate", post(generate))
        .route("/generate-all", post(generate_all))
        .route("/:id", get(get_payroll))
        .route("/:id/approve", post(approve))
        .route("/:id/pay", post(pay))
        .route("/:id/cancel", post(cancel))
}

#[derive(Debug, Deserialize)]
struct PeriodQuery {
    year: i32,
    month: u32,
}

fn service(state: &AppState) -> PayrollService {
    PayrollService::new(state.db.clone())
}

async fn list(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    Ok(ok(service(&state).list(&tenant.business, q.year, q.month).await?))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<GeneratePayrollRequest>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    let detail = service(&state)
        .generate(&tenant.business, &req, Utc::now())
        .await?;
    Ok(created(detail))
}

async fn generate_all(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<GenerateAllRequest>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    let result = service(&state)
        .generate_all(&tenant.business, &req, Utc::now())
        .await?;
    Ok(ok(result))
}

async fn get_payroll(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    Ok(ok(service(&state).get(&tenant.business, &id).await?))
}

async fn approve(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    Ok(ok(service(&state).approve(&tenant.business, &id).await?))
}

async fn pay(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    Ok(ok(service(&state).pay(&tenant.business, &id, Utc::now()).await?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    Ok(ok(service(&state).cancel(&tenant.business, &id).await?))
}
