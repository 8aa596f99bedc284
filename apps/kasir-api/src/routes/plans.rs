use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::{created, ok};
use crate::auth::SuperAdmin;
use crate::error::ApiResult;
use crate::services::subscription::NewPriceRequest;
use crate::services::SubscriptionService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_plans))
        .route("/:id/prices", post(add_price))
}

/// Public pricing page.
async fn list_plans(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    Ok(ok(SubscriptionService::new(state.db.clone()).list_plans().await?))
}

async fn add_price(
    State(state): State<Arc<AppState>>,
    SuperAdmin(_): SuperAdmin,
    Path(plan_id): Path<String>,
    Json(req): Json<NewPriceRequest>,
) -> ApiResult<Response> {
    let price = SubscriptionService::new(state.db.clone())
        .add_price(&plan_id, &req)
        .await?;
    Ok(created(price))
}
