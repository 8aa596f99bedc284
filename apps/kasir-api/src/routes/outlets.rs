use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use kasir_core::features::LimitResource;
use kasir_core::validation::{validate_name, validate_phone, validate_working_days};
use kasir_core::Outlet;
use kasir_db::generate_id;
use serde::Deserialize;
use tracing::info;

use super::{created, ok};
use crate::auth::Tenant;
use crate::error::{ApiError, ApiResult};
use crate::services::LimitsService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list).post(create))
}

#[derive(Debug, Deserialize)]
struct CreateOutletRequest {
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    /// Weekday numbers, 0 = Sunday.
    #[serde(default)]
    working_days: Option<Vec<u32>>,
}

async fn list(State(state): State<Arc<AppState>>, tenant: Tenant) -> ApiResult<Response> {
    Ok(ok(state.db.outlets().list_by_business(&tenant.business.id).await?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<CreateOutletRequest>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    validate_name("name", &req.name)?;
    if let Some(phone) = req.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        validate_phone(phone)?;
    }
    let working_days = match &req.working_days {
        Some(days) => {
            validate_working_days(days)?;
            Some(serde_json::to_string(days).map_err(|e| ApiError::internal(e.to_string()))?)
        }
        None => None,
    };

    let now = Utc::now();
    LimitsService::new(state.db.clone())
        .ensure_can_create(&tenant.business, LimitResource::Outlets, now)
        .await?;

    let outlet = Outlet {
        id: generate_id(),
        business_id: tenant.business.id.clone(),
        name: req.name.trim().to_string(),
        address: req.address,
        phone: req.phone,
        working_days,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.db.outlets().insert(&outlet).await?;
    info!(outlet_id = %outlet.id, business_id = %outlet.business_id, "Outlet created");

    Ok(created(outlet))
}
