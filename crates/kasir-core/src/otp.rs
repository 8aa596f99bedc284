//! # WhatsApp OTP
//!
//! Phone normalization and one-time code verification.
//!
//! ## Lifecycle
//! ```text
//! send ──► delete unverified codes for phone ──► insert (attempts = 0,
//!                                                expires = now + 10 min)
//!
//! verify ──► attempts += 1
//!              │
//!              ├── attempts > 5      → TooManyAttempts (row deleted)
//!              ├── verified_at set   → AlreadyVerified
//!              ├── expires_at ≤ now  → Expired
//!              ├── code differs      → Mismatch
//!              └── otherwise         → Verified (verified_at = now)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::{OTP_LENGTH, OTP_MAX_ATTEMPTS, OTP_TTL_MINUTES, OTP_VERIFIED_WINDOW_HOURS};

/// Normalizes an Indonesian number to the `62xxxxxxxxxx` form.
///
/// ## Example
/// ```rust
/// use kasir_core::otp::normalize_phone;
///
/// assert_eq!(normalize_phone("0812-3456-789"), "628123456789");
/// assert_eq!(normalize_phone("+62 812 3456 789"), "628123456789");
/// assert_eq!(normalize_phone("8123456789"), "628123456789");
/// ```
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Some(rest) = digits.strip_prefix('0') {
        format!("62{}", rest)
    } else if digits.starts_with("62") {
        digits
    } else {
        format!("62{}", digits)
    }
}

/// A stored verification code.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct WhatsappVerification {
    pub id: String,
    pub phone: String,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub code: String,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub verified_at: Option<DateTime<Utc>>,
    pub attempts: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OtpOutcome {
    Verified,
    Expired,
    AlreadyVerified,
    Mismatch,
    /// The code was burned; a new one must be requested.
    TooManyAttempts,
}

impl OtpOutcome {
    /// Converts a failed outcome into a `CoreError`.
    pub fn into_result(self) -> CoreResult<()> {
        let reason = match self {
            OtpOutcome::Verified => return Ok(()),
            OtpOutcome::Expired => "code expired",
            OtpOutcome::AlreadyVerified => "code already used",
            OtpOutcome::Mismatch => "code does not match",
            OtpOutcome::TooManyAttempts => "too many attempts",
        };
        Err(CoreError::OtpRejected {
            reason: reason.to_string(),
        })
    }
}

/// Expiry for a code issued at `now`.
pub fn otp_expires_at(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(OTP_TTL_MINUTES)
}

/// Formats a random draw as a zero-padded 6-digit code.
pub fn format_code(draw: u32) -> String {
    format!("{:0width$}", draw % 1_000_000, width = OTP_LENGTH)
}

impl WhatsappVerification {
    /// Counts the attempt and checks the code. The caller persists
    /// `attempts` and `verified_at`, or deletes the row on
    /// `TooManyAttempts`.
    pub fn check(&mut self, code: &str, now: DateTime<Utc>) -> OtpOutcome {
        self.attempts += 1;

        if self.attempts > OTP_MAX_ATTEMPTS {
            return OtpOutcome::TooManyAttempts;
        }
        if self.verified_at.is_some() {
            return OtpOutcome::AlreadyVerified;
        }
        if self.expires_at <= now {
            return OtpOutcome::Expired;
        }
        if !constant_time_eq(self.code.as_bytes(), code.trim().as_bytes()) {
            return OtpOutcome::Mismatch;
        }

        self.verified_at = Some(now);
        OtpOutcome::Verified
    }

    /// Verified within the last 24 hours.
    pub fn is_recently_verified(&self, now: DateTime<Utc>) -> bool {
        self.verified_at
            .is_some_and(|at| at > now - Duration::hours(OTP_VERIFIED_WINDOW_HOURS))
    }

    /// Expired and never verified: eligible for cleanup.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.verified_at.is_none() && self.expires_at < now
    }
}

/// Byte comparison whose running time does not depend on where the inputs
/// differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn verification(code: &str) -> WhatsappVerification {
        WhatsappVerification {
            id: "v-1".to_string(),
            phone: "628123456789".to_string(),
            code: code.to_string(),
            expires_at: otp_expires_at(now()),
            verified_at: None,
            attempts: 0,
            created_at: now(),
        }
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("08123456789"), "628123456789");
        assert_eq!(normalize_phone("628123456789"), "628123456789");
        assert_eq!(normalize_phone("(0812) 3456-789"), "628123456789");
    }

    #[test]
    fn test_format_code_pads() {
        assert_eq!(format_code(42), "000042");
        assert_eq!(format_code(123456), "123456");
        assert_eq!(format_code(7_123_456), "123456");
    }

    #[test]
    fn test_verify_success() {
        let mut v = verification("123456");
        assert_eq!(v.check("123456", now() + Duration::minutes(5)), OtpOutcome::Verified);
        assert!(v.verified_at.is_some());
        assert_eq!(v.attempts, 1);
        assert!(v.is_recently_verified(now() + Duration::hours(23)));
        assert!(!v.is_recently_verified(now() + Duration::hours(25)));
    }

    #[test]
    fn test_verify_expired() {
        let mut v = verification("123456");
        assert_eq!(v.check("123456", now() + Duration::minutes(10)), OtpOutcome::Expired);
        assert!(v.is_stale(now() + Duration::minutes(11)));
    }

    #[test]
    fn test_verify_reuse_rejected() {
        let mut v = verification("123456");
        assert_eq!(v.check("123456", now()), OtpOutcome::Verified);
        assert_eq!(v.check("123456", now()), OtpOutcome::AlreadyVerified);
    }

    #[test]
    fn test_attempt_limit() {
        let mut v = verification("123456");
        for _ in 0..5 {
            assert_eq!(v.check("000000", now()), OtpOutcome::Mismatch);
        }
        // Sixth try burns the code even when correct
        assert_eq!(v.check("123456", now()), OtpOutcome::TooManyAttempts);
    }

    #[test]
    fn test_outcome_into_result() {
        assert!(OtpOutcome::Verified.into_result().is_ok());
        assert!(matches!(
            OtpOutcome::Mismatch.into_result(),
            Err(CoreError::OtpRejected { .. })
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
