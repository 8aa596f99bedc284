//! # Error Types
//!
//! Domain-specific error types for kasir-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kasir-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  kasir-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  kasir-api errors                                                      │
//! │  └── ApiError         - What HTTP clients see (JSON + status)          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → Response               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::features::DowngradeIssue;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// Every variant maps to a 4xx response in the API layer. Nothing here is an
/// infrastructure failure.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The account profile is missing data required before purchasing.
    ///
    /// ## When This Occurs
    /// - Subscribing without name, phone, address or a verified WhatsApp number
    #[error("Profile incomplete, missing: {}", missing.join(", "))]
    ProfileIncomplete { missing: Vec<String> },

    /// The user already holds an active or pending subscription.
    #[error("Subscription {code} is already {status}")]
    SubscriptionExists { code: String, status: String },

    /// The selected price does not belong to the selected plan.
    #[error("Price {price_id} does not belong to plan {plan_id}")]
    PriceMismatch { plan_id: String, price_id: String },

    /// Trial can only be consumed once per account.
    #[error("Trial has already been used")]
    TrialAlreadyUsed,

    /// The current subscription is already a trial.
    #[error("Already on a trial subscription")]
    AlreadyOnTrial,

    /// Trial plans are only reachable through subscribe / downgrade.
    #[error("Cannot upgrade to a trial plan")]
    CannotUpgradeToTrial,

    /// Operation needs a current active subscription.
    #[error("No active subscription")]
    NoActiveSubscription,

    /// Current usage exceeds the target plan's limits.
    ///
    /// ## User Workflow
    /// ```text
    /// Owner on Professional (10 outlets, has 4)
    ///      │
    ///      ▼
    /// Downgrade to Basic (2 outlets)
    ///      │
    ///      ▼
    /// DowngradeBlocked { issues: [outlets: 4 > 2] }
    ///      │
    ///      ▼
    /// UI asks the owner to deactivate 2 outlets first
    /// ```
    #[error("Downgrade blocked by {} usage issue(s)", issues.len())]
    DowngradeBlocked { issues: Vec<DowngradeIssue> },

    /// Subscription is not in a state that allows the requested operation.
    #[error("Subscription {code} is {current_status}, cannot {action}")]
    InvalidSubscriptionStatus {
        code: String,
        current_status: String,
        action: String,
    },

    /// Plan limit reached for a resource.
    #[error("Limit reached for {resource}: {current}/{max}")]
    LimitReached {
        resource: String,
        current: i64,
        max: i64,
    },

    /// Insufficient stock to complete an order.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Order is not in a state that allows the requested operation.
    #[error("Order {order_number} is {current_status}, cannot {action}")]
    InvalidOrderStatus {
        order_number: String,
        current_status: String,
        action: String,
    },

    /// Payment amount is invalid.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Cashier shift was already closed.
    #[error("Cashier shift {0} is already closed")]
    ShiftAlreadyClosed(String),

    /// User already has an open cashier shift at the outlet.
    #[error("An open cashier shift already exists: {0}")]
    ShiftAlreadyOpen(String),

    /// Payroll is not in a state that allows the requested operation.
    #[error("Payroll {payroll_number} is {current_status}, cannot {action}")]
    InvalidPayrollStatus {
        payroll_number: String,
        current_status: String,
        action: String,
    },

    /// OTP verification failed.
    #[error("OTP rejected: {reason}")]
    OtpRejected { reason: String },

    /// Date arithmetic left chrono's supported range.
    #[error("Date out of range: {0}")]
    DateOutOfRange(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid email, invalid phone).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate SKU).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooShort { field, .. }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::NotAllowed { field, .. }
            | ValidationError::Duplicate { field, .. } => field,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
