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
use crate::services::shift::{CloseShiftRequest, OpenShiftRequest};
use crate::services::ShiftService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list))
        .route("/open", post(open))
        .route("/:id", get(summary))
        .route("/:id/close", post(close))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    outlet_id: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    30
}

async fn list(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Query(q): Query<ListQuery>,
) -> ApiResult<Response> {
    let shifts = ShiftService::new(state.db.clone())
        .list(&tenant.business, &q.outlet_id, q.limit.min(200))
        .await?;
    Ok(ok(shifts))
}

async fn open(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<OpenShiftRequest>,
) -> ApiResult<Response> {
    let shift = ShiftService::new(state.db.clone())
        .open(&tenant.business, &tenant.user, &req, Utc::now())
        .await?;
    Ok(created(shift))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    Ok(ok(ShiftService::new(state.db.clone()).summary(&tenant.business, &id).await?))
}

async fn close(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
    Json(req): Json<CloseShiftRequest>,
) -> ApiResult<Response> {
    let summary = ShiftService::new(state.db.clone())
        .close(&tenant.business, &tenant.user, &id, &req, Utc::now())
        .await?;
    Ok(ok(summary))
}
