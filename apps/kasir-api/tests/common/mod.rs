//! Shared setup for router tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use kasir_api::{build_router, AppConfig, AppState};
use kasir_core::subscription::{DurationType, SubscriptionPlan, SubscriptionPlanPrice};
use kasir_db::{generate_id, Database, DbConfig};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = AppConfig {
            frontend_url: "https://kasir.example.id".to_string(),
            ..AppConfig::default()
        };
        let state = Arc::new(AppState::new(db, None, config));
        TestApp {
            router: build_router(state.clone()),
            state,
        }
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Response<Body>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        (response.status(), response)
    }

    /// Sends a JSON request and returns status and parsed body.
    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, response) = self.send(request(method, uri, token, body)).await;
        (status, json_body(response).await)
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

/// Inserts a plan with one monthly price. Limits are
/// `[businesses, outlets, products, employees]`.
pub async fn plan(db: &Database, slug: &str, limits: [i64; 4], price: i64) -> (SubscriptionPlan, SubscriptionPlanPrice) {
    let now = Utc::now();
    let plan = SubscriptionPlan {
        id: generate_id(),
        name: slug.to_string(),
        slug: slug.to_string(),
        description: None,
        max_businesses: limits[0],
        max_outlets: limits[1],
        max_products: limits[2],
        max_employees: limits[3],
        has_reports_access: true,
        has_advanced_reports: false,
        has_kitchen_access: false,
        has_tables_access: false,
        has_attendance_access: true,
        has_inventory_access: false,
        has_promo_access: false,
        has_stock_transfer_access: false,
        has_self_service_access: false,
        has_online_integration: false,
        has_api_access: false,
        has_multi_location: false,
        features: "[]".to_string(),
        is_active: true,
        is_popular: false,
        cta_text: None,
        sort_order: 0,
        created_at: now,
        updated_at: now,
    };
    db.subscriptions().insert_plan(&plan).await.unwrap();

    let price = SubscriptionPlanPrice {
        id: generate_id(),
        plan_id: plan.id.clone(),
        duration_type: DurationType::Monthly,
        duration_months: 1,
        original_price: price,
        final_price: price,
        discount_percentage: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.subscriptions().insert_price(&price).await.unwrap();
    (plan, price)
}

/// Registers an owner through the API and returns `(user_id, access_token)`.
pub async fn register(app: &TestApp, email: &str) -> (String, String) {
    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "name": "Budi Santoso",
                "email": email,
                "password": "rahasia123",
                "address": "Jl. Merdeka 1, Bandung",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    (
        body["data"]["user"]["id"].as_str().unwrap().to_string(),
        body["data"]["access_token"].as_str().unwrap().to_string(),
    )
}
