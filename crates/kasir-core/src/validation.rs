//! # Validation Module
//!
//! Input checks run by handlers before any business rule or query.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: HTTP body deserialization (serde)                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (field formats and ranges)                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite (NOT NULL, UNIQUE, foreign keys)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kasir_core::validation::{validate_phone, validate_sku};
//!
//! validate_sku("KOPI-SUSU").unwrap();
//! validate_phone("081234567890").unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_AMOUNT, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Account Fields
// =============================================================================

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
///
/// ## Example
/// ```rust
/// use kasir_core::validation::validate_email;
///
/// assert!(validate_email("owner@warung.id").is_ok());
/// assert!(validate_email("owner@localhost").is_err());
/// ```
pub fn validate_email(email: &str) -> ValidationResult<()> {
    required("email", email)?;
    max_len("email", email, 255)?;

    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: "must be a valid email address".to_string(),
    };
    let (local, domain) = email.trim().split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.contains(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(())
}

/// At least 8 characters.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < 8 {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: 8,
        });
    }
    Ok(())
}

/// Indonesian mobile number: `+62`, `62` or `0` followed by 9 to 12 digits.
/// Separators (spaces, dashes, parentheses) are ignored.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    required("phone", phone)?;

    let compact: String = phone
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let rest = compact
        .strip_prefix("+62")
        .or_else(|| compact.strip_prefix("62"))
        .or_else(|| compact.strip_prefix('0'));

    match rest {
        Some(digits)
            if (9..=12).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) =>
        {
            Ok(())
        }
        _ => Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must start with +62, 62 or 0 followed by 9-12 digits".to_string(),
        }),
    }
}

/// Person, business and outlet names: 1 to 255 characters.
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    required(field, name)?;
    max_len(field, name, 255)
}

/// Six digits.
pub fn validate_otp_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();
    if code.len() != crate::OTP_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: format!("must be {} digits", crate::OTP_LENGTH),
        });
    }
    Ok(())
}

// =============================================================================
// Catalog & Orders
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - 1 to 50 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();
    required("sku", sku)?;
    max_len("sku", sku, 50)?;

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }
    Ok(())
}

/// Zero is allowed (free items, trial prices). Capped at `MAX_AMOUNT` so
/// quantities and sums of accepted amounts stay inside i64.
pub fn validate_price(field: &str, rupiah: i64) -> ValidationResult<()> {
    if !(0..=MAX_AMOUNT).contains(&rupiah) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT,
        });
    }
    Ok(())
}

pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

pub fn validate_payment_amount(rupiah: i64) -> ValidationResult<()> {
    if rupiah <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    if rupiah > MAX_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: MAX_AMOUNT,
        });
    }
    Ok(())
}

// =============================================================================
// Rates & Periods
// =============================================================================

/// Basis points between 0 and 10000 (0% to 100%).
pub fn validate_bps(field: &str, bps: i64) -> ValidationResult<()> {
    if !(0..=10_000).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

/// Calendar month, 1 to 12.
pub fn validate_month(month: u32) -> ValidationResult<()> {
    if !(1..=12).contains(&month) {
        return Err(ValidationError::OutOfRange {
            field: "month".to_string(),
            min: 1,
            max: 12,
        });
    }
    Ok(())
}

/// Plan durations sold: 1 to 12 months. Trials use 0 and bypass this check.
pub fn validate_duration_months(months: i64) -> ValidationResult<()> {
    if !(1..=12).contains(&months) {
        return Err(ValidationError::OutOfRange {
            field: "duration_months".to_string(),
            min: 1,
            max: 12,
        });
    }
    Ok(())
}

/// Weekday numbers 0 (Sunday) to 6, no duplicates, at least one.
pub fn validate_working_days(days: &[u32]) -> ValidationResult<()> {
    if days.is_empty() {
        return Err(ValidationError::Required {
            field: "working_days".to_string(),
        });
    }
    let mut seen = [false; 7];
    for &d in days {
        let slot = seen.get_mut(d as usize).ok_or(ValidationError::OutOfRange {
            field: "working_days".to_string(),
            min: 0,
            max: 6,
        })?;
        if *slot {
            return Err(ValidationError::Duplicate {
                field: "working_days".to_string(),
                value: d.to_string(),
            });
        }
        *slot = true;
    }
    Ok(())
}
