//! Subscription gate.
//!
//! ## Flow
//! ```text
//! request ──► exempt path? ──yes──────────────────────────────► handler
//!               │no
//!               ▼
//!          valid bearer token? ──no──► handler (extractor answers 401)
//!               │yes
//!               ▼
//!          super_admin? ──yes─────────────────────────────────► handler
//!               │no
//!               ▼
//!          employee ──► owner's history ──► employee_access
//!          owner    ──► own history     ──► owner_access
//!               │
//!               ├── Allowed  ──► handler (+ X-Subscription-Warning headers)
//!               ├── Pending  ──► 403 SUBSCRIPTION_PENDING
//!               └── Required ──► 403 SUBSCRIPTION_REQUIRED
//! ```
//!
//! The resolved user is stored in the request extensions so the `AuthUser`
//! extractor does not load it twice.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use kasir_core::subscription::{employee_access, owner_access, AccessDecision};
use kasir_core::{Role, User};
use serde_json::json;
use tracing::debug;

use crate::auth::{extract_bearer_token, AuthUser};
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::AppState;

pub const WARNING_HEADER: &str = "x-subscription-warning";
pub const DAYS_REMAINING_HEADER: &str = "x-subscription-days-remaining";

/// Prefixes reachable without a usable subscription.
const EXEMPT_PREFIXES: &[&str] = &[
    "/health",
    "/receipt/",
    "/api/auth/",
    "/api/otp/",
    "/api/subscription-plans",
    "/api/subscription/subscribe",
    "/api/subscription/upgrade",
    "/api/subscription/current",
    "/api/subscription/trial-status",
    "/api/subscription/history",
    "/api/payments/",
];

/// Paths that stay reachable without a subscription.
pub fn is_exempt(method: &Method, path: &str) -> bool {
    if EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return true;
    }
    if path.contains("manual-activate") {
        return true;
    }
    match path.trim_end_matches('/') {
        "/api/businesses" => method == Method::GET || method == Method::POST,
        "/api/businesses/current" => method == Method::GET,
        _ => false,
    }
}

/// `axum::middleware::from_fn_with_state` gate over the whole router.
pub async fn subscription_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    if is_exempt(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string);

    let Some(token) = token else {
        return Ok(next.run(request).await);
    };
    let user = match AuthUser::from_token(&state, &token).await {
        Ok(user) => user,
        Err(_) => return Ok(next.run(request).await),
    };

    if user.role == Role::SuperAdmin {
        request.extensions_mut().insert(AuthUser(user));
        return Ok(next.run(request).await);
    }

    let warning_days = match decide(&state, &user).await? {
        AccessDecision::Allowed { warning_days, in_grace_period, .. } => {
            if in_grace_period {
                debug!(user_id = %user.id, "Access granted in grace period");
            }
            warning_days
        }
        AccessDecision::Pending => return Err(ApiError::subscription_pending()),
        AccessDecision::Required if user.role.is_employee() => {
            return Err(ApiError::new(
                ErrorCode::SubscriptionRequired,
                "Business owner subscription has expired. Please contact your business owner to renew subscription.",
            )
            .with_details(json!({
                "subscription_required": true,
                "subscription_expired": true,
                "redirect_to": "/login",
            })));
        }
        AccessDecision::Required => {
            return Err(ApiError::subscription_required(
                "Subscription required to access this feature",
            ))
        }
    };

    request.extensions_mut().insert(AuthUser(user));
    let mut response = next.run(request).await;

    if let Some(days) = warning_days {
        let headers = response.headers_mut();
        headers.insert(WARNING_HEADER, HeaderValue::from_static("expires_soon"));
        headers.insert(DAYS_REMAINING_HEADER, HeaderValue::from(days));
    }
    Ok(response)
}

async fn decide(state: &AppState, user: &User) -> ApiResult<AccessDecision> {
    let now = Utc::now();

    if user.role.is_employee() {
        let employee = state.db.employees().find_by_user_id(&user.id).await?;
        let Some(employee) = employee else {
            return Err(ApiError::new(
                ErrorCode::SubscriptionRequired,
                "Employee not assigned to any business",
            )
            .with_details(json!({
                "subscription_required": true,
                "redirect_to": "/login",
            })));
        };
        let business = state.db.businesses().require(&employee.business_id).await?;
        let owner_history = state
            .db
            .subscriptions()
            .history_for_user(&business.owner_id)
            .await?;
        return Ok(employee_access(&owner_history, now));
    }

    let history = state.db.subscriptions().history_for_user(&user.id).await?;
    Ok(owner_access(&history, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt(&Method::GET, "/health"));
        assert!(is_exempt(&Method::POST, "/api/auth/login"));
        assert!(is_exempt(&Method::POST, "/api/subscription/upgrade-options"));
        assert!(is_exempt(&Method::POST, "/api/subscription/SUB-AB12/manual-activate"));
        assert!(is_exempt(&Method::POST, "/api/payments/midtrans/notification"));
        assert!(is_exempt(&Method::GET, "/receipt/abc"));
    }

    #[test]
    fn test_business_paths_exempt_by_method() {
        assert!(is_exempt(&Method::GET, "/api/businesses"));
        assert!(is_exempt(&Method::POST, "/api/businesses"));
        assert!(is_exempt(&Method::GET, "/api/businesses/current"));
        assert!(!is_exempt(&Method::POST, "/api/businesses/current"));
    }

    #[test]
    fn test_tenant_paths_gated() {
        assert!(!is_exempt(&Method::GET, "/api/products"));
        assert!(!is_exempt(&Method::POST, "/api/orders"));
        assert!(!is_exempt(&Method::GET, "/api/subscription/limits"));
        assert!(!is_exempt(&Method::POST, "/api/subscription/cancel"));
    }
}
