use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;

use super::ok;
use crate::auth::Tenant;
use crate::error::ApiResult;
use crate::services::LimitsService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(features))
}

/// Feature flags of the tenant's plan, for menu visibility.
async fn features(State(state): State<Arc<AppState>>, tenant: Tenant) -> ApiResult<Response> {
    let features = LimitsService::new(state.db.clone())
        .features(&tenant.business, Utc::now())
        .await?;
    Ok(ok(features))
}
