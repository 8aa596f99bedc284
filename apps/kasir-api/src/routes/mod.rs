//! HTTP routes.
//!
//! ## Layout
//! ```text
//! /health                          health
//! /receipt/:token                  receipt   (public)
//! /api/auth/*                      auth
//! /api/otp/*                       otp
//! /api/subscription-plans/*        plans
//! /api/subscription/*              subscription
//! /api/payments/*                  payments  (Midtrans webhook, status)
//! /api/businesses/*                businesses
//! /api/outlets/*                   outlets          ┐
//! /api/products/*                  products         │
//! /api/employees/*                 employees        │ gated by
//! /api/orders/*                    orders           │ subscription
//! /api/cashier-shifts/*            cashier_shifts   │
//! /api/payrolls/*                  payrolls         │
//! /api/features                    features         ┘
//! ```
//!
//! Successful bodies are `{ "success": true, "data": ... }`; errors come
//! from [`crate::error::ApiError`].

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use crate::AppState;

mod auth;
mod businesses;
mod cashier_shifts;
mod employees;
mod features;
mod health;
mod orders;
mod otp;
mod outlets;
mod payments;
mod payrolls;
mod plans;
mod products;
mod receipt;
mod subscription;

/// 200 with the standard success envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

/// 201 with the standard success envelope.
pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(json!({ "success": true, "data": data }))).into_response()
}

/// Every route of the service. State is attached by [`crate::build_router`].
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(receipt::routes())
        .nest("/api/auth", auth::routes())
        .nest("/api/otp", otp::routes())
        .nest("/api/subscription-plans", plans::routes())
        .nest("/api/subscription", subscription::routes())
        .nest("/api/payments", payments::routes())
        .nest("/api/businesses", businesses::routes())
        .nest("/api/outlets", outlets::routes())
        .nest("/api/products", products::routes())
        .nest("/api/employees", employees::routes())
        .nest("/api/orders", orders::routes())
        .nest("/api/cashier-shifts", cashier_shifts::routes())
        .nest("/api/payrolls", payrolls::routes())
        .nest("/api/features", features::routes())
}
