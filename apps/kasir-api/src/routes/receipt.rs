use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use super::ok;
use crate::error::ApiResult;
use crate::services::OrderService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/receipt/:token", get(receipt))
}

/// Public receipt page data, linked from the WhatsApp receipt message.
async fn receipt(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> ApiResult<Response> {
    let service = OrderService::new(state.db.clone(), state.config.frontend_url.clone());
    Ok(ok(service.receipt(&token).await?))
}
