//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Kasir                                  │
//! │                                                                         │
//! │  Handler → Result<Json<T>, ApiError>                                    │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Database Error? ─── DbError::UniqueViolation ───┐                     │
//! │         │                                         │                     │
//! │         ▼                                         ▼                     │
//! │  Business Rule? ──── CoreError::LimitReached ─── ApiError ──► Response │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Success ───────────────────────────────────────────────────► 200 JSON │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Response Body
//! ```json
//! {
//!   "success": false,
//!   "code": "LIMIT_REACHED",
//!   "message": "Limit reached for outlets: 1/1",
//!   "details": { "resource": "outlets", "current": 1, "max": 1 }
//! }
//! ```
//!
//! Infrastructure failures are logged with their cause and answered with a
//! generic message.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kasir_core::{CoreError, ValidationError};
use kasir_db::DbError;
use serde::Serialize;
use serde_json::{json, Value};

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned from handlers, middleware and extractors.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Structured context (missing fields, limit numbers, downgrade issues)
    pub details: Option<Value>,
}

/// Error codes for API responses.
///
/// ## Usage in Frontend
/// ```typescript
/// switch (body.code) {
///   case 'SUBSCRIPTION_REQUIRED':
///     navigate(body.details.redirect_to);
///     break;
///   case 'PROFILE_INCOMPLETE':
///     showProfileForm(body.details.missing_fields);
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Input validation failed (422)
    ValidationError,

    /// Profile data missing before purchase (422)
    ProfileIncomplete,

    /// Usage exceeds the target plan (422)
    DowngradeBlocked,

    /// OTP code rejected (422)
    OtpRejected,

    /// Unique value already taken (409)
    Duplicate,

    /// Concurrent modification or state conflict (409)
    Conflict,

    /// Missing or invalid credentials (401)
    Unauthorized,

    /// Authenticated but not permitted (403)
    Forbidden,

    /// No usable subscription (403)
    SubscriptionRequired,

    /// Payment pending, no grace subscription (403)
    SubscriptionPending,

    /// Plan quota exhausted (403)
    LimitReached,

    /// Too many attempts in the current window (429)
    TooManyRequests,

    /// Business rule violation (400)
    BusinessLogic,

    /// Insufficient stock (400)
    InsufficientStock,

    /// Payment processing error (400)
    PaymentError,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub const fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError
            | ErrorCode::ProfileIncomplete
            | ErrorCode::DowngradeBlocked
            | ErrorCode::OtpRejected => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Duplicate | ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden
            | ErrorCode::SubscriptionRequired
            | ErrorCode::SubscriptionPending
            | ErrorCode::LimitReached => StatusCode::FORBIDDEN,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::BusinessLogic | ErrorCode::InsufficientStock | ErrorCode::PaymentError => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Forbidden, message)
    }

    pub fn business(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::BusinessLogic, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    /// Gate rejection: nothing usable.
    pub fn subscription_required(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::SubscriptionRequired, message).with_details(json!({
            "subscription_required": true,
            "redirect_to": "/subscription-plans",
        }))
    }

    /// Gate rejection: a payment is still being processed.
    pub fn subscription_pending() -> Self {
        ApiError::new(
            ErrorCode::SubscriptionPending,
            "Pembayaran sedang diproses. Silakan refresh halaman dalam beberapa saat.",
        )
        .with_details(json!({
            "subscription_pending": true,
            "redirect_to": "/payment/pending",
        }))
    }

    /// Rate limit rejection; `retry_after` is in seconds.
    pub fn too_many_requests(retry_after: u64) -> Self {
        ApiError::new(
            ErrorCode::TooManyRequests,
            format!("Terlalu banyak percobaan. Coba lagi dalam {} detik.", retry_after),
        )
        .with_details(json!({ "retry_after": retry_after }))
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            code: self.code,
            message: &self.message,
            details: self.details.as_ref(),
        };
        let mut response = (self.status(), Json(body)).into_response();
        if self.code == ErrorCode::TooManyRequests {
            if let Some(secs) = self.details.as_ref().and_then(|d| d["retry_after"].as_u64()) {
                response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
            }
        }
        response
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::Duplicate,
                format!("{} '{}' already exists", field, value),
            )
            .with_details(json!({ "field": field })),
            DbError::Conflict { entity, id, reason } => ApiError::new(
                ErrorCode::Conflict,
                format!("{} {} changed concurrently: {}", entity, id, reason),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::CorruptData { column, reason } => {
                tracing::error!(column = %column, "Corrupt stored data: {}", reason);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::ProfileIncomplete { missing } => ApiError::new(
                ErrorCode::ProfileIncomplete,
                "Lengkapi profil Anda sebelum berlangganan",
            )
            .with_details(json!({ "missing_fields": missing })),
            CoreError::SubscriptionExists { code, status } => ApiError::business(message)
                .with_details(json!({ "subscription_code": code, "status": status })),
            CoreError::PriceMismatch { .. } | CoreError::DateOutOfRange(_) => {
                ApiError::validation(message)
            }
            CoreError::DowngradeBlocked { issues } => {
                ApiError::new(ErrorCode::DowngradeBlocked, message)
                    .with_details(json!({ "issues": issues }))
            }
            CoreError::LimitReached { resource, current, max } => {
                ApiError::new(ErrorCode::LimitReached, message).with_details(json!({
                    "resource": resource,
                    "current": current,
                    "max": max,
                }))
            }
            CoreError::InsufficientStock { sku, available, requested } => {
                ApiError::new(ErrorCode::InsufficientStock, message).with_details(json!({
                    "sku": sku,
                    "available": available,
                    "requested": requested,
                }))
            }
            CoreError::InvalidPaymentAmount { .. } => ApiError::new(ErrorCode::PaymentError, message),
            CoreError::ShiftAlreadyOpen(_) => ApiError::new(ErrorCode::Conflict, message),
            CoreError::OtpRejected { .. } => ApiError::new(ErrorCode::OtpRejected, message),
            CoreError::Validation(v) => v.into(),
            CoreError::TrialAlreadyUsed
            | CoreError::AlreadyOnTrial
            | CoreError::CannotUpgradeToTrial
            | CoreError::NoActiveSubscription
            | CoreError::InvalidSubscriptionStatus { .. }
            | CoreError::InvalidOrderStatus { .. }
            | CoreError::ShiftAlreadyClosed(_)
            | CoreError::InvalidPayrollStatus { .. } => ApiError::business(message),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let field = err.field().to_string();
        ApiError::validation(err.to_string()).with_details(json!({ "field": field }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_reached_is_forbidden_with_numbers() {
        let err: ApiError = CoreError::LimitReached {
            resource: "outlets".to_string(),
            current: 1,
            max: 1,
        }
        .into();

        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let details = err.details.unwrap();
        assert_eq!(details["resource"], "outlets");
        assert_eq!(details["max"], 1);
    }

    #[test]
    fn test_profile_incomplete_lists_fields() {
        let err: ApiError = CoreError::ProfileIncomplete {
            missing: vec!["phone".to_string(), "whatsapp_verified".to_string()],
        }
        .into();

        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.details.unwrap()["missing_fields"][1], "whatsapp_verified");
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err: ApiError = DbError::duplicate("email", "a@b.id").into();
        assert_eq!(err.code, ErrorCode::Duplicate);
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_query_failure_hides_cause() {
        let err: ApiError = DbError::QueryFailed("no such column: secret".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("secret"));
    }

    #[test]
    fn test_gate_errors_carry_redirect() {
        let pending = ApiError::subscription_pending();
        assert_eq!(pending.status(), StatusCode::FORBIDDEN);
        assert_eq!(pending.details.as_ref().unwrap()["subscription_pending"], true);

        let required = ApiError::subscription_required("Subscription required");
        assert_eq!(required.details.unwrap()["redirect_to"], "/subscription-plans");
    }

    #[test]
    fn test_too_many_requests_carries_retry_after() {
        let err = ApiError::too_many_requests(42);
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.details.as_ref().unwrap()["retry_after"], 42);
        let response = err.into_response();
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
        assert_eq!(
            serde_json::to_value(ErrorCode::TooManyRequests).unwrap(),
            "TOO_MANY_REQUESTS"
        );
    }

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(
            serde_json::to_value(ErrorCode::SubscriptionRequired).unwrap(),
            "SUBSCRIPTION_REQUIRED"
        );
    }
}
