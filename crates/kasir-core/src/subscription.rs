//! # Subscription Lifecycle
//!
//! Plans, prices, user subscriptions and the rules that move a subscription
//! between states.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    UserSubscription.status                              │
//! │                                                                         │
//! │   subscribe (paid) ──► pending_payment ──settlement──► active           │
//! │                             │      │                     │              │
//! │                  cancel/deny│      │ renewal of same     │ upgrade paid │
//! │                             ▼      │ plan                ▼              │
//! │                         cancelled  └──► completed     upgraded          │
//! │                                                          ▲              │
//! │   subscribe (trial) ─────────────────────► active ───────┘              │
//! │                                              │                          │
//! │                                   ends_at ≤ now (sweep)                 │
//! │                                              ▼                          │
//! │                                           expired                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! "Active" for access purposes always means `status == active AND
//! ends_at > now`. A row can keep `status = active` past its end date until
//! the expiry sweep runs; every check here uses the clock, not just the flag.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::{GRACE_PERIOD_DAYS, TRIAL_DAYS, TRIAL_PLAN_SLUG, UPGRADE_MIN_REMAINING_DAYS};

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PendingPayment,
    Expired,
    Cancelled,
    /// Replaced by a newer subscription on a different plan.
    Upgraded,
    /// Renewal payment folded into an existing subscription.
    Completed,
}

impl SubscriptionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PendingPayment => "pending_payment",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Upgraded => "upgraded",
            SubscriptionStatus::Completed => "completed",
        }
    }

    /// Allowed edges of the state machine.
    pub const fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Active)
                | (PendingPayment, Cancelled)
                | (PendingPayment, Completed)
                | (PendingPayment, Expired)
                | (Active, Expired)
                | (Active, Cancelled)
                | (Active, Upgraded)
        )
    }

    /// Active or pending: blocks a fresh `subscribe`.
    pub const fn is_open(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PendingPayment)
    }
}

// =============================================================================
// Plan & Price
// =============================================================================

/// A subscription tier (trial / basic / professional / enterprise).
///
/// `max_*` limits use `-1` for unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub max_businesses: i64,
    pub max_outlets: i64,
    pub max_products: i64,
    pub max_employees: i64,
    pub has_reports_access: bool,
    pub has_advanced_reports: bool,
    pub has_kitchen_access: bool,
    pub has_tables_access: bool,
    pub has_attendance_access: bool,
    pub has_inventory_access: bool,
    pub has_promo_access: bool,
    pub has_stock_transfer_access: bool,
    pub has_self_service_access: bool,
    pub has_online_integration: bool,
    pub has_api_access: bool,
    pub has_multi_location: bool,
    /// JSON array of marketing bullet points.
    pub features: String,
    pub is_active: bool,
    pub is_popular: bool,
    pub cta_text: Option<String>,
    /// Tier ordering. Lower means cheaper; used to detect downgrades.
    pub sort_order: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    pub fn is_trial(&self) -> bool {
        self.slug == TRIAL_PLAN_SLUG
    }

    /// Marketing bullet points; empty when the column is malformed.
    pub fn feature_list(&self) -> Vec<String> {
        serde_json::from_str(&self.features).unwrap_or_default()
    }
}

/// Billing period of a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DurationType {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

/// A purchasable duration of a plan. Unique per (plan_id, duration_months).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SubscriptionPlanPrice {
    pub id: String,
    pub plan_id: String,
    pub duration_type: DurationType,
    /// 0 for the trial price.
    pub duration_months: i64,
    pub original_price: i64,
    pub final_price: i64,
    /// Whole percent shown on the pricing page.
    pub discount_percentage: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlanPrice {
    #[inline]
    pub fn final_price(&self) -> Money {
        Money::from_rupiah(self.final_price)
    }
}

// =============================================================================
// User Subscription
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct UserSubscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub plan_price_id: String,
    /// `SUB-` + 10 uppercase alphanumerics; also the gateway order id prefix.
    pub subscription_code: String,
    pub status: SubscriptionStatus,
    pub amount_paid: i64,
    #[ts(as = "String")]
    pub starts_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub ends_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub is_trial: bool,
    pub payment_method: Option<String>,
    pub gateway_payment_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    /// Status active and not yet past its end.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.ends_at > now
    }

    /// Whole days until `ends_at`, never negative.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.ends_at - now).num_days().max(0)
    }

    /// Length of the paid period in days, at least 1.
    pub fn total_days(&self) -> i64 {
        (self.ends_at - self.starts_at).num_days().max(1)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_rupiah(self.amount_paid)
    }

    /// Moves to `next` if the edge exists.
    pub fn transition(&mut self, next: SubscriptionStatus, action: &str) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidSubscriptionStatus {
                code: self.subscription_code.clone(),
                current_status: self.status.as_str().to_string(),
                action: action.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// User-initiated cancel. Only active or pending subscriptions qualify.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.transition(SubscriptionStatus::Cancelled, "cancel")?;
        self.append_note(&format!("Cancelled by user at {}", now.to_rfc3339()));
        Ok(())
    }

    /// Appends to `notes` with a ` | ` separator.
    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{} | {}", existing, note),
            _ => note.to_string(),
        });
    }

    /// Days left before the 3-day expiry warning fires, if it applies.
    ///
    /// ## Example
    /// ```text
    /// ends_at = now + 2 days 5 hours → Some(2)
    /// ends_at = now + 10 days        → None
    /// ends_at = now + 6 hours        → None (0 whole days)
    /// ```
    pub fn expiry_warning(&self, now: DateTime<Utc>) -> Option<i64> {
        let days = (self.ends_at - now).num_days();
        (days > 0 && days <= crate::EXPIRY_WARNING_DAYS).then_some(days)
    }
}

/// A recorded payment for a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SubscriptionPayment {
    pub id: String,
    pub user_subscription_id: String,
    pub payment_code: String,
    pub payment_method: String,
    pub amount: i64,
    pub status: String,
    pub gateway_payment_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchase Planning
// =============================================================================

/// A subscription ready to be inserted. Code and id are assigned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub plan_id: String,
    pub plan_price_id: String,
    pub status: SubscriptionStatus,
    pub amount_paid: Money,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub is_trial: bool,
}

/// The trial plan slug or a free price both count as a trial purchase.
pub fn is_trial_purchase(plan: &SubscriptionPlan, price: &SubscriptionPlanPrice) -> bool {
    plan.is_trial() || price.final_price == 0
}

pub fn ensure_price_belongs_to_plan(
    plan: &SubscriptionPlan,
    price: &SubscriptionPlanPrice,
) -> CoreResult<()> {
    if price.plan_id != plan.id {
        return Err(CoreError::PriceMismatch {
            plan_id: plan.id.clone(),
            price_id: price.id.clone(),
        });
    }
    Ok(())
}

/// Rejects a new purchase while another subscription is active or pending.
pub fn ensure_no_open_subscription(history: &[UserSubscription]) -> CoreResult<()> {
    match history.iter().find(|s| s.status.is_open()) {
        Some(open) => Err(CoreError::SubscriptionExists {
            code: open.subscription_code.clone(),
            status: open.status.as_str().to_string(),
        }),
        None => Ok(()),
    }
}

/// Adds calendar months, e.g. Jan 31 + 1 month = Feb 28/29.
pub fn add_months(at: DateTime<Utc>, months: i64) -> CoreResult<DateTime<Utc>> {
    let months = u32::try_from(months)
        .map_err(|_| CoreError::DateOutOfRange(format!("invalid month count {}", months)))?;
    at.checked_add_months(Months::new(months))
        .ok_or_else(|| CoreError::DateOutOfRange(format!("{} + {} months", at, months)))
}

/// Decides the shape of a brand-new subscription.
///
/// ## Rules
/// - Trial: once per account, active immediately for 7 days, free
/// - Paid: pending until the gateway confirms, runs `duration_months`
///   calendar months from now, costs `final_price`
pub fn plan_subscription(
    plan: &SubscriptionPlan,
    price: &SubscriptionPlanPrice,
    now: DateTime<Utc>,
    has_used_trial: bool,
) -> CoreResult<NewSubscription> {
    ensure_price_belongs_to_plan(plan, price)?;

    if is_trial_purchase(plan, price) {
        if has_used_trial {
            return Err(CoreError::TrialAlreadyUsed);
        }
        let ends_at = now + Duration::days(TRIAL_DAYS);
        return Ok(NewSubscription {
            plan_id: plan.id.clone(),
            plan_price_id: price.id.clone(),
            status: SubscriptionStatus::Active,
            amount_paid: Money::zero(),
            starts_at: now,
            ends_at,
            trial_ends_at: Some(ends_at),
            is_trial: true,
        });
    }

    Ok(NewSubscription {
        plan_id: plan.id.clone(),
        plan_price_id: price.id.clone(),
        status: SubscriptionStatus::PendingPayment,
        amount_paid: price.final_price(),
        starts_at: now,
        ends_at: add_months(now, price.duration_months)?,
        trial_ends_at: None,
        is_trial: false,
    })
}

/// Plans the replacement trial for `downgrade-to-trial`.
pub fn plan_trial_downgrade(
    current: Option<&UserSubscription>,
    history: &[UserSubscription],
    trial_plan: &SubscriptionPlan,
    trial_price: &SubscriptionPlanPrice,
    now: DateTime<Utc>,
) -> CoreResult<NewSubscription> {
    if current.is_some_and(|s| s.is_trial) {
        return Err(CoreError::AlreadyOnTrial);
    }
    if history.iter().any(|s| s.is_trial) {
        return Err(CoreError::TrialAlreadyUsed);
    }
    plan_subscription(trial_plan, trial_price, now, false)
}

/// When a paid upgrade is pending, the old subscription must outlive the
/// payment window. Returns the extended end date if an extension is needed.
pub fn pending_upgrade_extension(
    current: &UserSubscription,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    (current.days_remaining(now) < UPGRADE_MIN_REMAINING_DAYS)
        .then(|| now + Duration::days(UPGRADE_MIN_REMAINING_DAYS))
}

// =============================================================================
// Payment Settlement
// =============================================================================

/// What to do with the subscription rows when a payment succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Same plan already active: push its end date out and close the
    /// payment-tracking row as `completed`.
    Renewal {
        extend_id: String,
        new_ends_at: DateTime<Utc>,
    },
    /// New plan: activate the pending row and retire the other active ones.
    Activation { supersede_ids: Vec<String> },
}

impl Settlement {
    /// Id of the subscription the owner's businesses should point at.
    pub fn effective_subscription_id<'a>(&'a self, paid: &'a UserSubscription) -> &'a str {
        match self {
            Settlement::Renewal { extend_id, .. } => extend_id,
            Settlement::Activation { .. } => &paid.id,
        }
    }
}

/// Decides between renewal and activation for a successful payment.
///
/// `others` are the user's other subscriptions in any state.
pub fn settle_payment(paid: &UserSubscription, others: &[UserSubscription]) -> CoreResult<Settlement> {
    if paid.status != SubscriptionStatus::PendingPayment {
        return Err(CoreError::InvalidSubscriptionStatus {
            code: paid.subscription_code.clone(),
            current_status: paid.status.as_str().to_string(),
            action: "confirm payment".to_string(),
        });
    }

    let active: Vec<&UserSubscription> = others
        .iter()
        .filter(|s| s.id != paid.id && s.status == SubscriptionStatus::Active)
        .collect();

    if let Some(same_plan) = active.iter().find(|s| s.plan_id == paid.plan_id && !s.is_trial) {
        return Ok(Settlement::Renewal {
            extend_id: same_plan.id.clone(),
            new_ends_at: paid.ends_at.max(same_plan.ends_at),
        });
    }

    Ok(Settlement::Activation {
        supersede_ids: active.iter().map(|s| s.id.clone()).collect(),
    })
}

// =============================================================================
// Trial Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TrialStatus {
    pub has_used_trial: bool,
    pub has_active_trial: bool,
    pub trial_ended: bool,
    pub has_active_paid_subscription: bool,
}

impl TrialStatus {
    pub fn from_history(history: &[UserSubscription], now: DateTime<Utc>) -> Self {
        let has_used_trial = history.iter().any(|s| s.is_trial);
        let has_active_trial = history.iter().any(|s| s.is_trial && s.is_active(now));
        let has_active_paid_subscription = history.iter().any(|s| !s.is_trial && s.is_active(now));

        TrialStatus {
            has_used_trial,
            has_active_trial,
            trial_ended: has_used_trial && !has_active_trial,
            has_active_paid_subscription,
        }
    }
}

/// The subscription that currently grants access, latest end date first.
pub fn current_active(history: &[UserSubscription], now: DateTime<Utc>) -> Option<&UserSubscription> {
    history
        .iter()
        .filter(|s| s.is_active(now))
        .max_by_key(|s| s.ends_at)
}

// =============================================================================
// Access Gate
// =============================================================================

/// Outcome of the subscription gate for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed {
        subscription_id: String,
        /// Set when the subscription ends within the warning window.
        warning_days: Option<i64>,
        in_grace_period: bool,
    },
    /// A payment is pending and no grace subscription exists.
    Pending,
    /// Nothing usable at all.
    Required,
}

/// Gate for owners, evaluated over their subscription history.
///
/// ## Grace Period
/// ```text
/// no active subscription
///      │
///      ▼
/// pending_payment exists? ──no──► Required
///      │yes
///      ▼
/// active or expired row with ends_at > now - 7d? ──no──► Pending
///      │yes
///      ▼
/// Allowed (grace)
/// ```
pub fn owner_access(history: &[UserSubscription], now: DateTime<Utc>) -> AccessDecision {
    if let Some(active) = current_active(history, now) {
        return AccessDecision::Allowed {
            subscription_id: active.id.clone(),
            warning_days: active.expiry_warning(now),
            in_grace_period: false,
        };
    }

    let has_pending = history
        .iter()
        .any(|s| s.status == SubscriptionStatus::PendingPayment);
    if !has_pending {
        return AccessDecision::Required;
    }

    // The expiry sweep flips lapsed rows to expired; they still carry grace.
    let grace_cutoff = now - Duration::days(GRACE_PERIOD_DAYS);
    let recent = history
        .iter()
        .filter(|s| matches!(s.status, SubscriptionStatus::Active | SubscriptionStatus::Expired))
        .filter(|s| s.ends_at > grace_cutoff)
        .max_by_key(|s| s.ends_at);

    match recent {
        Some(sub) => AccessDecision::Allowed {
            subscription_id: sub.id.clone(),
            warning_days: None,
            in_grace_period: true,
        },
        None => AccessDecision::Pending,
    }
}

/// Gate for employees: only the owner's strictly active subscription counts.
pub fn employee_access(owner_history: &[UserSubscription], now: DateTime<Utc>) -> AccessDecision {
    match current_active(owner_history, now) {
        Some(active) => AccessDecision::Allowed {
            subscription_id: active.id.clone(),
            warning_days: None,
            in_grace_period: false,
        },
        None => AccessDecision::Required,
    }
}

// =============================================================================
// Codes
// =============================================================================

/// Builds a subscription code from a random suffix.
pub fn subscription_code(suffix: &str) -> String {
    format!("SUB-{}", suffix.to_ascii_uppercase())
}

/// Gateway order ids are `SUB-XXXXXXXXXX-<timestamp>`; the code is the first
/// two dash-separated parts.
///
/// ## Example
/// ```rust
/// use kasir_core::subscription::subscription_code_from_order_id;
///
/// assert_eq!(
///     subscription_code_from_order_id("SUB-AB12CD34EF-1718000000"),
///     Some("SUB-AB12CD34EF".to_string())
/// );
/// assert_eq!(subscription_code_from_order_id("garbage"), None);
/// ```
pub fn subscription_code_from_order_id(order_id: &str) -> Option<String> {
    let mut parts = order_id.split('-');
    let prefix = parts.next()?;
    let code = parts.next()?;
    if prefix.is_empty() || code.is_empty() {
        return None;
    }
    Some(format!("{}-{}", prefix, code))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    pub(crate) fn plan(id: &str, slug: &str, sort_order: i64) -> SubscriptionPlan {
        SubscriptionPlan {
            id: id.to_string(),
            name: slug.to_string(),
            slug: slug.to_string(),
            description: None,
            max_businesses: 1,
            max_outlets: 2,
            max_products: 500,
            max_employees: 10,
            has_reports_access: true,
            has_advanced_reports: false,
            has_kitchen_access: false,
            has_tables_access: false,
            has_attendance_access: false,
            has_inventory_access: false,
            has_promo_access: false,
            has_stock_transfer_access: false,
            has_self_service_access: false,
            has_online_integration: false,
            has_api_access: false,
            has_multi_location: false,
            features: r#"["1 Bisnis","2 Outlet"]"#.to_string(),
            is_active: true,
            is_popular: false,
            cta_text: None,
            sort_order,
            created_at: now(),
            updated_at: now(),
        }
    }

    pub(crate) fn price(id: &str, plan_id: &str, months: i64, final_price: i64) -> SubscriptionPlanPrice {
        SubscriptionPlanPrice {
            id: id.to_string(),
            plan_id: plan_id.to_string(),
            duration_type: DurationType::Monthly,
            duration_months: months,
            original_price: final_price,
            final_price,
            discount_percentage: 0,
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    pub(crate) fn sub(
        id: &str,
        plan_id: &str,
        status: SubscriptionStatus,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        amount_paid: i64,
    ) -> UserSubscription {
        UserSubscription {
            id: id.to_string(),
            user_id: "u-1".to_string(),
            plan_id: plan_id.to_string(),
            plan_price_id: format!("{}-price", plan_id),
            subscription_code: format!("SUB-{}", id.to_ascii_uppercase()),
            status,
            amount_paid,
            starts_at,
            ends_at,
            trial_ends_at: None,
            is_trial: false,
            payment_method: None,
            gateway_payment_id: None,
            paid_at: None,
            notes: None,
            created_at: starts_at,
            updated_at: starts_at,
        }
    }

    #[test]
    fn test_trial_subscription_lasts_seven_days() {
        let trial = plan("p-trial", TRIAL_PLAN_SLUG, 0);
        let free = price("pr-trial", "p-trial", 0, 0);

        let new = plan_subscription(&trial, &free, now(), false).unwrap();
        assert!(new.is_trial);
        assert_eq!(new.status, SubscriptionStatus::Active);
        assert_eq!(new.ends_at - new.starts_at, Duration::days(7));
        assert_eq!(new.trial_ends_at, Some(new.ends_at));
        assert!(new.amount_paid.is_zero());
    }

    #[test]
    fn test_trial_only_once() {
        let trial = plan("p-trial", TRIAL_PLAN_SLUG, 0);
        let free = price("pr-trial", "p-trial", 0, 0);
        let err = plan_subscription(&trial, &free, now(), true).unwrap_err();
        assert!(matches!(err, CoreError::TrialAlreadyUsed));
    }

    #[test]
    fn test_free_price_counts_as_trial() {
        let basic = plan("p-basic", "basic", 1);
        let free = price("pr-free", "p-basic", 1, 0);
        assert!(is_trial_purchase(&basic, &free));
        assert!(plan_subscription(&basic, &free, now(), true).is_err());
    }

    #[test]
    fn test_paid_subscription_is_pending_for_calendar_months() {
        let basic = plan("p-basic", "basic", 1);
        let annual = price("pr-annual", "p-basic", 12, 1_500_000);

        let new = plan_subscription(&basic, &annual, now(), true).unwrap();
        assert_eq!(new.status, SubscriptionStatus::PendingPayment);
        assert_eq!(new.amount_paid.rupiah(), 1_500_000);
        assert_eq!(new.ends_at, Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap());
        assert!(!new.is_trial);
    }

    #[test]
    fn test_price_must_belong_to_plan() {
        let basic = plan("p-basic", "basic", 1);
        let other = price("pr-x", "p-pro", 1, 300_000);
        assert!(matches!(
            plan_subscription(&basic, &other, now(), false),
            Err(CoreError::PriceMismatch { .. })
        ));
    }

    #[test]
    fn test_open_subscription_blocks_new_purchase() {
        let pending = sub("a", "p-basic", SubscriptionStatus::PendingPayment, now(), now(), 0);
        let expired = sub("b", "p-basic", SubscriptionStatus::Expired, now(), now(), 0);
        assert!(ensure_no_open_subscription(&[expired.clone()]).is_ok());
        assert!(matches!(
            ensure_no_open_subscription(&[expired, pending]),
            Err(CoreError::SubscriptionExists { .. })
        ));
    }

    #[test]
    fn test_is_active_uses_clock() {
        let s = sub(
            "a",
            "p",
            SubscriptionStatus::Active,
            now() - Duration::days(30),
            now() - Duration::hours(1),
            0,
        );
        assert!(!s.is_active(now()));
        assert_eq!(s.days_remaining(now()), 0);
    }

    #[test]
    fn test_cancel_only_open_states() {
        let mut active = sub("a", "p", SubscriptionStatus::Active, now(), now() + Duration::days(5), 0);
        active.cancel(now()).unwrap();
        assert_eq!(active.status, SubscriptionStatus::Cancelled);
        assert!(active.notes.as_deref().unwrap().starts_with("Cancelled by user at"));

        let mut expired = sub("b", "p", SubscriptionStatus::Expired, now(), now(), 0);
        assert!(matches!(
            expired.cancel(now()),
            Err(CoreError::InvalidSubscriptionStatus { .. })
        ));
    }

    #[test]
    fn test_append_note() {
        let mut s = sub("a", "p", SubscriptionStatus::Active, now(), now(), 0);
        s.append_note("first");
        s.append_note("second");
        assert_eq!(s.notes.as_deref(), Some("first | second"));
    }

    #[test]
    fn test_expiry_warning_window() {
        let soon = sub("a", "p", SubscriptionStatus::Active, now(), now() + Duration::hours(53), 0);
        assert_eq!(soon.expiry_warning(now()), Some(2));

        let later = sub("b", "p", SubscriptionStatus::Active, now(), now() + Duration::days(10), 0);
        assert_eq!(later.expiry_warning(now()), None);

        let today = sub("c", "p", SubscriptionStatus::Active, now(), now() + Duration::hours(6), 0);
        assert_eq!(today.expiry_warning(now()), None);
    }

    #[test]
    fn test_owner_access_active() {
        let s = sub("a", "p", SubscriptionStatus::Active, now(), now() + Duration::days(20), 0);
        match owner_access(&[s], now()) {
            AccessDecision::Allowed { subscription_id, in_grace_period, warning_days } => {
                assert_eq!(subscription_id, "a");
                assert!(!in_grace_period);
                assert_eq!(warning_days, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_owner_access_grace_period_with_pending_payment() {
        let lapsed = sub(
            "old",
            "p",
            SubscriptionStatus::Active,
            now() - Duration::days(30),
            now() - Duration::days(3),
            0,
        );
        let pending = sub("new", "p2", SubscriptionStatus::PendingPayment, now(), now() + Duration::days(30), 0);

        match owner_access(&[lapsed.clone(), pending.clone()], now()) {
            AccessDecision::Allowed { subscription_id, in_grace_period, .. } => {
                assert_eq!(subscription_id, "old");
                assert!(in_grace_period);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Lapsed beyond 7 days: pending only
        let long_gone = sub(
            "old",
            "p",
            SubscriptionStatus::Active,
            now() - Duration::days(60),
            now() - Duration::days(8),
            0,
        );
        assert_eq!(owner_access(&[long_gone, pending], now()), AccessDecision::Pending);
    }

    #[test]
    fn test_grace_period_survives_expiry_sweep() {
        let swept = sub(
            "old",
            "p",
            SubscriptionStatus::Expired,
            now() - Duration::days(30),
            now() - Duration::days(1),
            0,
        );
        let pending = sub("new", "p2", SubscriptionStatus::PendingPayment, now(), now() + Duration::days(30), 0);
        assert!(matches!(
            owner_access(&[swept, pending.clone()], now()),
            AccessDecision::Allowed { in_grace_period: true, .. }
        ));

        // A cancelled row never grants grace
        let cancelled = sub(
            "old",
            "p",
            SubscriptionStatus::Cancelled,
            now() - Duration::days(30),
            now() - Duration::days(1),
            0,
        );
        assert_eq!(owner_access(&[cancelled, pending], now()), AccessDecision::Pending);
    }

    #[test]
    fn test_owner_access_required_without_pending() {
        let lapsed = sub(
            "old",
            "p",
            SubscriptionStatus::Active,
            now() - Duration::days(30),
            now() - Duration::days(1),
            0,
        );
        assert_eq!(owner_access(&[lapsed], now()), AccessDecision::Required);
        assert_eq!(owner_access(&[], now()), AccessDecision::Required);
    }

    #[test]
    fn test_employee_access_has_no_grace() {
        let lapsed = sub(
            "old",
            "p",
            SubscriptionStatus::Active,
            now() - Duration::days(30),
            now() - Duration::days(1),
            0,
        );
        let pending = sub("new", "p2", SubscriptionStatus::PendingPayment, now(), now() + Duration::days(30), 0);
        assert_eq!(employee_access(&[lapsed, pending], now()), AccessDecision::Required);
    }

    #[test]
    fn test_trial_status() {
        let mut trial = sub("t", "p-trial", SubscriptionStatus::Active, now(), now() + Duration::days(7), 0);
        trial.is_trial = true;

        let status = TrialStatus::from_history(&[trial.clone()], now());
        assert!(status.has_used_trial);
        assert!(status.has_active_trial);
        assert!(!status.trial_ended);
        assert!(!status.has_active_paid_subscription);

        trial.status = SubscriptionStatus::Expired;
        let paid = sub("p", "p-basic", SubscriptionStatus::Active, now(), now() + Duration::days(30), 150_000);
        let status = TrialStatus::from_history(&[trial, paid], now());
        assert!(status.trial_ended);
        assert!(status.has_active_paid_subscription);
    }

    #[test]
    fn test_downgrade_to_trial_rules() {
        let trial_plan = plan("p-trial", TRIAL_PLAN_SLUG, 0);
        let trial_price = price("pr-trial", "p-trial", 0, 0);
        let paid = sub("p", "p-basic", SubscriptionStatus::Active, now(), now() + Duration::days(30), 150_000);

        let new = plan_trial_downgrade(Some(&paid), &[paid.clone()], &trial_plan, &trial_price, now()).unwrap();
        assert!(new.is_trial);

        let mut used = paid.clone();
        used.is_trial = true;
        used.status = SubscriptionStatus::Expired;
        assert!(matches!(
            plan_trial_downgrade(Some(&paid), &[paid.clone(), used.clone()], &trial_plan, &trial_price, now()),
            Err(CoreError::TrialAlreadyUsed)
        ));

        let mut on_trial = paid.clone();
        on_trial.is_trial = true;
        assert!(matches!(
            plan_trial_downgrade(Some(&on_trial), &[on_trial.clone()], &trial_plan, &trial_price, now()),
            Err(CoreError::AlreadyOnTrial)
        ));
    }

    #[test]
    fn test_pending_upgrade_extension() {
        let short = sub("a", "p", SubscriptionStatus::Active, now(), now() + Duration::days(3), 0);
        assert_eq!(pending_upgrade_extension(&short, now()), Some(now() + Duration::days(7)));

        let long = sub("b", "p", SubscriptionStatus::Active, now(), now() + Duration::days(20), 0);
        assert_eq!(pending_upgrade_extension(&long, now()), None);
    }

    #[test]
    fn test_settle_payment_upgrade_supersedes_active() {
        let old = sub("old", "p-basic", SubscriptionStatus::Active, now(), now() + Duration::days(10), 150_000);
        let paid = sub("new", "p-pro", SubscriptionStatus::PendingPayment, now(), now() + Duration::days(40), 300_000);

        let settlement = settle_payment(&paid, &[old, paid.clone()]).unwrap();
        assert_eq!(
            settlement,
            Settlement::Activation {
                supersede_ids: vec!["old".to_string()]
            }
        );
        assert_eq!(settlement.effective_subscription_id(&paid), "new");
    }

    #[test]
    fn test_settle_payment_same_plan_is_renewal() {
        let old = sub("old", "p-basic", SubscriptionStatus::Active, now(), now() + Duration::days(10), 150_000);
        let paid = sub("new", "p-basic", SubscriptionStatus::PendingPayment, now(), now() + Duration::days(40), 150_000);

        let settlement = settle_payment(&paid, &[old]).unwrap();
        assert_eq!(
            settlement,
            Settlement::Renewal {
                extend_id: "old".to_string(),
                new_ends_at: now() + Duration::days(40),
            }
        );
        assert_eq!(settlement.effective_subscription_id(&paid), "old");
    }

    #[test]
    fn test_settle_payment_requires_pending() {
        let active = sub("a", "p", SubscriptionStatus::Active, now(), now() + Duration::days(10), 0);
        assert!(settle_payment(&active, &[]).is_err());
    }

    #[test]
    fn test_subscription_codes() {
        assert_eq!(subscription_code("ab12cd34ef"), "SUB-AB12CD34EF");
        assert_eq!(
            subscription_code_from_order_id("SUB-AB12CD34EF"),
            Some("SUB-AB12CD34EF".to_string())
        );
        assert_eq!(subscription_code_from_order_id("-X"), None);
    }

    #[test]
    fn test_feature_list_parses_json() {
        assert_eq!(plan("p", "basic", 1).feature_list(), vec!["1 Bisnis", "2 Outlet"]);
        let mut broken = plan("p", "basic", 1);
        broken.features = "nope".to_string();
        assert!(broken.feature_list().is_empty());
    }
}
