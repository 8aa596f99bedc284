//! # Kasir API
//!
//! REST server for the Kasir dashboard, the cashier app and the Midtrans
//! payment gateway.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Kasir API Layers                               │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  tower-http: TraceLayer, CorsLayer                               │  │
//! │  ├──────────────────────────────────────────────────────────────────┤  │
//! │  │  rate_limit::rate_limit          (429 on auth / OTP floods)      │  │
//! │  ├──────────────────────────────────────────────────────────────────┤  │
//! │  │  middleware::subscription_gate   (403 / warning headers)         │  │
//! │  ├──────────────────────────────────────────────────────────────────┤  │
//! │  │  routes::*      extractors: AuthUser, Tenant, SuperAdmin         │  │
//! │  ├──────────────────────────────────────────────────────────────────┤  │
//! │  │  services::*    subscription, limits, orders, shifts, payroll,   │  │
//! │  │                 otp, webhook, health, sweep                       │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────────────┐  │
//! │  │  kasir-db    │  │    Redis     │  │  kasir-core                  │  │
//! │  │  SQLite      │  │  (optional)  │  │  pricing, proration, gate,   │  │
//! │  │              │  │  idempotency │  │  payroll, reconciliation     │  │
//! │  │              │  │  rate limits │  │                              │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config::AppConfig`]. Everything can be set through environment
//! variables (`DATABASE_URL`, `JWT_SECRET`, `MIDTRANS_SERVER_KEY`, ...).

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use kasir_db::Database;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// Re-exports
pub use auth::JwtManager;
pub use config::AppConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use rate_limit::RateLimiter;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub redis: Option<redis::Client>,
    pub jwt: JwtManager,
    pub rate_limiter: RateLimiter,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: Database, redis: Option<redis::Client>, config: AppConfig) -> Self {
        let jwt = JwtManager::new(
            config.jwt_secret.clone(),
            config.jwt_access_lifetime_secs,
            config.jwt_refresh_lifetime_secs,
        );
        let rate_limiter = RateLimiter::new(config.rate_limit_enabled, redis.clone());
        AppState {
            db,
            redis,
            jwt,
            rate_limiter,
            config,
        }
    }
}

/// Builds the full HTTP application.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.cors_allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        match state.config.frontend_url.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                tracing::warn!(url = %state.config.frontend_url, "FRONTEND_URL is not a valid origin, CORS disabled");
                CorsLayer::new()
            }
        }
    };

    routes::router()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::subscription_gate,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
