use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use kasir_core::otp::normalize_phone;
use serde::Deserialize;

use super::ok;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::rate_limit::RateLimitKind;
use crate::services::OtpService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/send", post(send))
        .route("/verify", post(verify))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    phone: String,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    phone: String,
    code: String,
}

async fn send(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<SendRequest>,
) -> ApiResult<Response> {
    // Per number as well as per client, so rotating addresses cannot flood one phone.
    state
        .rate_limiter
        .check(RateLimitKind::OtpSend, &format!("phone:{}", normalize_phone(&req.phone)))
        .await?;
    let sent = OtpService::new(state.db.clone())
        .send(&user, &req.phone, Utc::now())
        .await?;
    Ok(ok(sent))
}

async fn verify(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Response> {
    let verified = OtpService::new(state.db.clone())
        .verify(&user, &req.phone, &req.code, Utc::now())
        .await?;
    Ok(ok(verified))
}
