//! # Money Module
//!
//! Provides the `Money` type for rupiah amounts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Rp 150.000 / 30 days = Rp 5.000 per day                                │
//! │  Rp 100.000 / 30 days = Rp 3.333,333... per day                         │
//! │                                                                         │
//! │  Summing float per-day values over a subscription period drifts.       │
//! │                                                                         │
//! │  OUR SOLUTION: whole rupiah in i64                                      │
//! │    Every division rounds explicitly (half up) and in one place.        │
//! │    Rupiah has no circulating minor unit, so 1 unit = Rp 1.              │
//! │                                                                         │
//! │  OVERFLOW: inputs are capped at MAX_AMOUNT (Rp 1 trillion) by           │
//! │  validation. Arithmetic here saturates at the i64 bounds instead of     │
//! │  wrapping or panicking.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kasir_core::money::Money;
//!
//! let monthly = Money::from_rupiah(150_000);
//! let annual = monthly * 12;
//! assert_eq!(annual.rupiah(), 1_800_000);
//! assert_eq!(annual.to_string(), "Rp 1.800.000");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in whole rupiah.
///
/// ## Design Decisions
/// - **i64 (signed)**: negative values appear in shift differences and change
///   owed on partially paid orders
/// - **Single field tuple struct**: zero-cost over i64, stored as INTEGER
/// - **Saturating operators**: `+`, `-`, `*` clamp at the i64 bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from whole rupiah.
    #[inline]
    pub const fn from_rupiah(rupiah: i64) -> Self {
        Money(rupiah)
    }

    /// Returns the value in whole rupiah.
    #[inline]
    pub const fn rupiah(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.saturating_abs())
    }

    /// Clamps negative amounts to zero.
    ///
    /// ## Example
    /// ```rust
    /// use kasir_core::money::Money;
    ///
    /// assert_eq!(Money::from_rupiah(-500).non_negative(), Money::zero());
    /// assert_eq!(Money::from_rupiah(500).non_negative().rupiah(), 500);
    /// ```
    #[inline]
    pub fn non_negative(self) -> Self {
        Money(self.0.max(0))
    }

    /// Calculates tax with half-up rounding.
    ///
    /// ## Implementation
    /// Integer math: `(amount * rate + 5000) / 10000`
    /// The +5000 provides rounding (5000/10000 = 0.5)
    ///
    /// ## Example
    /// ```rust
    /// use kasir_core::money::Money;
    /// use kasir_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_rupiah(45_500);
    /// let ppn = TaxRate::from_bps(1100); // PPN 11%
    /// assert_eq!(subtotal.calculate_tax(ppn).rupiah(), 5_005);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.percentage_bps(rate.bps())
    }

    /// Returns `bps` basis points of this amount, rounded half up.
    ///
    /// ## Example
    /// ```rust
    /// use kasir_core::money::Money;
    ///
    /// // 40% of Rp 99.999 = Rp 39.999,6 → Rp 40.000
    /// assert_eq!(Money::from_rupiah(99_999).percentage_bps(4000).rupiah(), 40_000);
    /// ```
    pub fn percentage_bps(&self, bps: u32) -> Money {
        let part = (self.0 as i128 * bps as i128 + 5000) / 10000;
        Money::clamped(part)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Arguments
    /// * `discount_bps` - Discount in basis points (1000 = 10%)
    pub fn apply_percentage_discount(&self, discount_bps: u32) -> Money {
        *self - self.percentage_bps(discount_bps)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Adds, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    #[inline]
    pub const fn checked_mul(&self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Narrows an i128 intermediate back to i64, saturating at the bounds.
    fn clamped(value: i128) -> Money {
        Money(value.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Divides by `divisor`, rounding half away from zero.
    ///
    /// Returns zero when `divisor` is zero so per-day and per-hour rates
    /// degrade to "no rate" instead of panicking.
    ///
    /// ## Example
    /// ```rust
    /// use kasir_core::money::Money;
    ///
    /// assert_eq!(Money::from_rupiah(100_000).divide_round(30).rupiah(), 3_333);
    /// assert_eq!(Money::from_rupiah(5).divide_round(2).rupiah(), 3);
    /// assert_eq!(Money::from_rupiah(5).divide_round(0), Money::zero());
    /// ```
    pub fn divide_round(&self, divisor: i64) -> Money {
        if divisor == 0 {
            return Money::zero();
        }
        let n = self.0 as i128;
        let d = divisor as i128;
        let q = (2 * n + d.signum() * n.signum() * d.abs()) / (2 * d);
        Money::clamped(q)
    }

    /// Multiplies by `numerator / denominator` in one rounding step.
    ///
    /// Used where an intermediate division would lose precision, e.g.
    /// `base / expected_days * present_days` for pro-rated salary.
    pub fn scale(&self, numerator: i64, denominator: i64) -> Money {
        if denominator == 0 {
            return Money::zero();
        }
        let n = self.0 as i128 * numerator as i128;
        let d = denominator as i128;
        let q = (2 * n + d.signum() * n.signum() * d.abs()) / (2 * d);
        Money::clamped(q)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Indonesian formatting: `Rp 1.500.000`, negative as `-Rp 25.000`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        write!(f, "{}Rp {}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
