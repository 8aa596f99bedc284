use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::services::health::ServingStatus;
use crate::services::HealthService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Deserialize)]
struct HealthQuery {
    #[serde(default)]
    service: String,
}

/// 503 when the checked component is down, so load balancers can act on it.
async fn health(State(state): State<Arc<AppState>>, Query(q): Query<HealthQuery>) -> Response {
    let report = HealthService::new(state.db.clone(), state.redis.clone())
        .check(&q.service)
        .await;
    let status = match report.status {
        ServingStatus::NotServing => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}
