//! # Upgrade Proration
//!
//! Converts what is left of the current subscription into bonus days on the
//! new one. The buyer always pays the full price of the new plan; credit is
//! never refunded as money.
//!
//! ## Credit Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remaining_value = amount_paid × remaining_days / total_days            │
//! │                                                                         │
//! │  SAME PLAN (renewal)                                                    │
//! │    bonus_days = remaining_days                    credit = 100%         │
//! │                                                                         │
//! │  DIFFERENT PLAN                                                         │
//! │    converted  = remaining_value × 40%                                   │
//! │    from_value = ⌊converted / new_daily⌋                                 │
//! │    bonus_days = min(60, max(remaining_days, from_value))  credit = 40%  │
//! │                                                                         │
//! │  new ends_at = now + months × 30 + bonus_days                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `from_value` is computed in one integer division so daily rates never
//! accumulate rounding error.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::subscription::{SubscriptionPlan, SubscriptionPlanPrice, UserSubscription};
use crate::{CROSS_PLAN_CREDIT_BPS, DAYS_PER_MONTH, MAX_BONUS_DAYS};

/// Priced preview of an upgrade, returned by `upgrade-options` and used to
/// size the new subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct UpgradeQuote {
    pub current_plan_id: String,
    pub target_plan_id: String,
    pub target_price_id: String,
    pub is_same_plan: bool,
    pub is_downgrade: bool,
    pub remaining_days: i64,
    pub remaining_value: Money,
    pub current_daily_rate: Money,
    pub new_daily_rate: Money,
    /// Part of `remaining_value` converted into days.
    pub credit: Money,
    /// 100 for a renewal, 40 across plans, 0 when nothing remains.
    pub credit_percentage: i64,
    pub bonus_days: i64,
    /// `duration_months × 30`.
    pub base_days: i64,
    pub total_days: i64,
    pub amount_to_pay: Money,
    pub effective_daily_rate: Money,
    #[ts(as = "String")]
    pub new_ends_at: DateTime<Utc>,
}

/// A lower tier than the current one.
pub fn is_downgrade(current: &SubscriptionPlan, target: &SubscriptionPlan) -> bool {
    target.sort_order < current.sort_order
}

/// Prices an upgrade from `current` to `target_price` of `target_plan`.
///
/// ## Example
/// ```text
/// Basic 1 month, Rp 150.000, 30 days, 15 days left
/// → Professional 1 month, Rp 300.000
///
/// remaining_value = 150.000 × 15 / 30   = 75.000
/// converted       = 75.000 × 40%        = 30.000
/// new_daily       = 300.000 / 30        = 10.000
/// from_value      = ⌊30.000 / 10.000⌋   = 3
/// bonus_days      = min(60, max(15, 3)) = 15
/// total_days      = 30 + 15             = 45
/// ```
pub fn upgrade_quote(
    current: &UserSubscription,
    current_plan: &SubscriptionPlan,
    target_plan: &SubscriptionPlan,
    target_price: &SubscriptionPlanPrice,
    now: DateTime<Utc>,
) -> CoreResult<UpgradeQuote> {
    if target_plan.is_trial() {
        return Err(CoreError::CannotUpgradeToTrial);
    }
    crate::subscription::ensure_price_belongs_to_plan(target_plan, target_price)?;

    let is_same_plan = current.plan_id == target_plan.id;
    let remaining_days = current.days_remaining(now);
    let total_current_days = current.total_days();
    let amount_paid = current.amount_paid();

    let current_daily_rate = amount_paid.divide_round(total_current_days);
    let remaining_value = amount_paid.scale(remaining_days, total_current_days);

    let base_days = target_price.duration_months * DAYS_PER_MONTH;
    let final_price = target_price.final_price();
    let new_daily_rate = final_price.divide_round(base_days);

    let (bonus_days, credit, credit_percentage) = if is_same_plan {
        let pct = if remaining_value.is_positive() { 100 } else { 0 };
        (remaining_days, remaining_value, pct)
    } else {
        let converted = remaining_value.percentage_bps(CROSS_PLAN_CREDIT_BPS);
        let from_value = days_from_value(
            remaining_days,
            amount_paid,
            total_current_days,
            base_days,
            final_price,
        );
        let bonus = remaining_days.max(from_value).min(MAX_BONUS_DAYS);
        let pct = if remaining_value.is_positive() {
            i64::from(CROSS_PLAN_CREDIT_BPS / 100)
        } else {
            0
        };
        (bonus, converted, pct)
    };

    let total_days = base_days + bonus_days;

    Ok(UpgradeQuote {
        current_plan_id: current_plan.id.clone(),
        target_plan_id: target_plan.id.clone(),
        target_price_id: target_price.id.clone(),
        is_same_plan,
        is_downgrade: is_downgrade(current_plan, target_plan),
        remaining_days,
        remaining_value,
        current_daily_rate,
        new_daily_rate,
        credit,
        credit_percentage,
        bonus_days,
        base_days,
        total_days,
        amount_to_pay: final_price,
        effective_daily_rate: final_price.divide_round(total_days),
        new_ends_at: now + Duration::days(total_days),
    })
}

/// `⌊remaining × paid × 40% × base_days / (total × final_price)⌋`, 0 for a
/// free target.
fn days_from_value(
    remaining_days: i64,
    amount_paid: Money,
    total_days: i64,
    base_days: i64,
    final_price: Money,
) -> i64 {
    if !final_price.is_positive() || total_days <= 0 {
        return 0;
    }
    let numerator = remaining_days as i128
        * amount_paid.rupiah() as i128
        * CROSS_PLAN_CREDIT_BPS as i128
        * base_days as i128;
    let denominator = 10_000i128 * total_days as i128 * final_price.rupiah() as i128;
    (numerator / denominator) as i64
}
