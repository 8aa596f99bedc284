use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use kasir_core::features::LimitResource;
use kasir_core::validation::{validate_name, validate_price, validate_sku};
use kasir_core::Product;
use kasir_db::generate_id;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{created, ok};
use crate::auth::Tenant;
use crate::error::{ApiError, ApiResult};
use crate::services::LimitsService;
use crate::AppState;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 500;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_product).delete(delete_product))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CreateProductRequest {
    sku: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    price: i64,
    #[serde(default)]
    stock: i64,
    #[serde(default = "default_track_stock")]
    track_stock: bool,
}

fn default_track_stock() -> bool {
    true
}

async fn list(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Query(q): Query<ListQuery>,
) -> ApiResult<Response> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let products = state
        .db
        .products()
        .list_by_business(&tenant.business.id, q.q.as_deref(), limit)
        .await?;
    Ok(ok(products))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let product = state
        .db
        .products()
        .get_for_business(&tenant.business.id, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", &id))?;
    Ok(ok(product))
}

async fn create(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    validate_sku(&req.sku)?;
    validate_name("name", &req.name)?;
    validate_price("price", req.price)?;
    validate_price("stock", req.stock)?;

    let now = Utc::now();
    LimitsService::new(state.db.clone())
        .ensure_can_create(&tenant.business, LimitResource::Products, now)
        .await?;

    let product = Product {
        id: generate_id(),
        business_id: tenant.business.id.clone(),
        sku: req.sku.trim().to_string(),
        name: req.name.trim().to_string(),
        description: req.description,
        price: req.price,
        stock: req.stock,
        track_stock: req.track_stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.db.products().insert(&product).await?;
    info!(product_id = %product.id, sku = %product.sku, "Product created");

    Ok(created(product))
}

/// Soft delete; frees a slot in the plan's product quota.
async fn delete_product(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    state.db.products().soft_delete(&tenant.business.id, &id).await?;
    Ok(ok(json!({ "id": id, "deleted": true })))
}
