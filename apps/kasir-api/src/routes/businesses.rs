use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use kasir_core::validation::{validate_name, validate_phone};
use kasir_core::{Business, Role};
use kasir_db::generate_id;
use serde::Deserialize;
use tracing::info;

use super::{created, ok};
use crate::auth::{AuthUser, Tenant};
use crate::error::{ApiError, ApiResult};
use crate::services::LimitsService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/current", get(current))
}

#[derive(Debug, Deserialize)]
struct CreateBusinessRequest {
    name: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

async fn list(State(state): State<Arc<AppState>>, AuthUser(user): AuthUser) -> ApiResult<Response> {
    Ok(ok(state.db.businesses().list_by_owner(&user.id).await?))
}

/// The business the request resolves to (`X-Business-Id` or the first one).
async fn current(tenant: Tenant) -> ApiResult<Response> {
    Ok(ok(tenant.business))
}

async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateBusinessRequest>,
) -> ApiResult<Response> {
    if user.role != Role::Owner {
        return Err(ApiError::forbidden("Only business owners can create a business"));
    }
    validate_name("name", &req.name)?;
    if let Some(phone) = req.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        validate_phone(phone)?;
    }

    let now = Utc::now();
    LimitsService::new(state.db.clone())
        .ensure_can_create_business(&user.id, now)
        .await?;

    // A new business inherits the owner's running subscription.
    let history = state.db.subscriptions().history_for_user(&user.id).await?;
    let active = kasir_core::subscription::current_active(&history, now);

    let business = Business {
        id: generate_id(),
        owner_id: user.id.clone(),
        name: req.name.trim().to_string(),
        phone: req.phone.filter(|p| !p.trim().is_empty()),
        address: req.address.filter(|a| !a.trim().is_empty()),
        current_subscription_id: active.map(|s| s.id.clone()),
        subscription_expires_at: active.map(|s| s.ends_at),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.db.businesses().insert(&business).await?;
    info!(business_id = %business.id, owner_id = %user.id, "Business created");

    Ok(created(business))
}
