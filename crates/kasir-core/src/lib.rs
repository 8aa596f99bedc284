//! # kasir-core: Pure Business Rules for Kasir
//!
//! Everything that decides what should happen in the Kasir POS backend,
//! as pure functions over plain data.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasir Backend                                    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 kasir-api (axum HTTP service)                   │   │
//! │  │   auth ──► subscription gate ──► handlers ──► services          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kasir-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │  subscription  proration  features  otp  order  shift  payroll │   │
//! │  │  money  types  messages  validation                            │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • NO RANDOMNESS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 kasir-db (SQLite repositories)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`subscription`] - Plans, prices, subscription state machine, access gate
//! - [`proration`] - Upgrade quotes with bonus days
//! - [`features`] - Feature flags, plan limits, downgrade feasibility
//! - [`otp`] - Phone normalization and WhatsApp OTP checks
//! - [`order`] - Order totals and payments
//! - [`shift`] - Cashier shift reconciliation
//! - [`payroll`] - Monthly salary calculation
//! - [`messages`] - WhatsApp message templates
//! - [`money`] - Integer rupiah
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use kasir_core::money::Money;
//! use kasir_core::types::TaxRate;
//!
//! let subtotal = Money::from_rupiah(150_000);
//! let ppn = subtotal.calculate_tax(TaxRate::from_bps(1100));
//! assert_eq!(ppn.rupiah(), 16_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod features;
pub mod messages;
pub mod money;
pub mod order;
pub mod otp;
pub mod payroll;
pub mod proration;
pub mod shift;
pub mod subscription;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Slug of the free trial plan.
pub const TRIAL_PLAN_SLUG: &str = "trial-7-days";

/// Trial length.
pub const TRIAL_DAYS: i64 = 7;

/// Stored in `max_*` plan columns for "no limit".
pub const UNLIMITED: i64 = -1;

/// How long an owner keeps access after expiry while a payment is pending.
pub const GRACE_PERIOD_DAYS: i64 = 7;

/// Requests carry an expiry warning header within this many days.
pub const EXPIRY_WARNING_DAYS: i64 = 3;

/// A pending paid upgrade keeps the old subscription alive at least this long.
pub const UPGRADE_MIN_REMAINING_DAYS: i64 = 7;

/// Cap on bonus days granted by an upgrade.
pub const MAX_BONUS_DAYS: i64 = 60;

/// Share of remaining value converted to days across plans (40%).
pub const CROSS_PLAN_CREDIT_BPS: u32 = 4000;

/// Month length for proration.
pub const DAYS_PER_MONTH: i64 = 30;

pub const OTP_LENGTH: usize = 6;
pub const OTP_TTL_MINUTES: i64 = 10;
pub const OTP_MAX_ATTEMPTS: i64 = 5;

/// A verified number counts as verified for this long.
pub const OTP_VERIFIED_WINDOW_HOURS: i64 = 24;

/// Late penalty per occurrence in rupiah.
pub const DEFAULT_LATE_PENALTY: i64 = 50_000;

/// Regular shift length; anything beyond is overtime.
pub const STANDARD_SHIFT_MINUTES: i64 = 480;

/// Maximum quantity of one line item.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest single amount accepted from input (Rp 1 trillion).
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;
