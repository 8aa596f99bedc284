use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use super::ok;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::services::{SubscriptionService, WebhookService};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/midtrans/notification", post(midtrans_notification))
        .route("/status/:code", get(payment_status))
}

/// Gateway callback. The body is read raw so malformed payloads can still
/// be acknowledged.
async fn midtrans_notification(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Response> {
    let service = WebhookService::new(
        state.db.clone(),
        state.config.midtrans_server_key.clone(),
        state.redis.clone(),
    );
    let ack = service.handle(&body, Utc::now()).await?;
    Ok(Json(ack).into_response())
}

async fn payment_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(code): Path<String>,
) -> ApiResult<Response> {
    let status = SubscriptionService::new(state.db.clone())
        .payment_status(&user, &code)
        .await?;
    Ok(ok(status))
}
