//! Subscription lifecycle.
//!
//! ## Purchase Flow
//! ```text
//! subscribe ─┬─ trial ──────────────► active (7 days), businesses repointed
//!            └─ paid ───────────────► pending_payment
//!                                         │
//!            webhook / manual-activate ───┤
//!                                         ▼
//!                    ┌── same plan active ──► renewal: extend, row completed
//! confirm_payment ───┤
//!                    └── otherwise ─────────► activation: row active,
//!                                              other actives upgraded
//! ```
//!
//! Upgrades price the switch with [`kasir_core::proration::upgrade_quote`];
//! a free upgrade activates immediately, a paid one waits for the gateway
//! like a fresh purchase.

use chrono::{DateTime, Utc};
use kasir_core::features::DowngradeIssue;
use kasir_core::proration::{upgrade_quote, UpgradeQuote};
use kasir_core::subscription::{
    current_active, ensure_no_open_subscription, pending_upgrade_extension, plan_subscription,
    plan_trial_downgrade, settle_payment, NewSubscription, SubscriptionPayment, SubscriptionPlan,
    SubscriptionPlanPrice, SubscriptionStatus, TrialStatus, UserSubscription,
};
use kasir_core::{CoreError, User, TRIAL_PLAN_SLUG};
use kasir_db::{generate_id, Database};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::services::LimitsService;

/// A plan with its active prices, as listed on the pricing page.
#[derive(Debug, Clone, Serialize)]
pub struct PlanWithPrices {
    #[serde(flatten)]
    pub plan: SubscriptionPlan,
    pub feature_list: Vec<String>,
    pub prices: Vec<SubscriptionPlanPrice>,
}

/// Body of `POST /api/subscription-plans/:id/prices`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPriceRequest {
    pub duration_type: kasir_core::subscription::DurationType,
    pub duration_months: i64,
    pub original_price: i64,
    pub discount_percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentSubscription {
    pub subscription: Option<UserSubscription>,
    pub plan: Option<SubscriptionPlan>,
    pub days_remaining: i64,
    /// Set when the subscription ends within the warning window.
    pub expires_soon_days: Option<i64>,
    /// The newest subscription still awaiting payment.
    pub pending: Option<UserSubscription>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeOptions {
    pub quote: UpgradeQuote,
    pub can_downgrade: bool,
    pub downgrade_issues: Vec<DowngradeIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeOutcome {
    pub subscription: UserSubscription,
    pub quote: UpgradeQuote,
    pub requires_payment: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatus {
    pub subscription_code: String,
    pub status: SubscriptionStatus,
    pub subscription: UserSubscription,
    pub payments: Vec<SubscriptionPayment>,
}

#[derive(Clone)]
pub struct SubscriptionService {
    db: Database,
}

impl SubscriptionService {
    pub fn new(db: Database) -> Self {
        SubscriptionService { db }
    }

    // =========================================================================
    // Plans
    // =========================================================================

    pub async fn list_plans(&self) -> ApiResult<Vec<PlanWithPrices>> {
        let plans = self.db.subscriptions().list_active_plans().await?;
        let mut listed = Vec::with_capacity(plans.len());
        for plan in plans {
            let prices = self
                .db
                .subscriptions()
                .prices_for_plan(&plan.id)
                .await?
                .into_iter()
                .filter(|p| p.is_active)
                .collect();
            listed.push(PlanWithPrices {
                feature_list: plan.feature_list(),
                plan,
                prices,
            });
        }
        Ok(listed)
    }

    /// Adds a duration price to a plan. The final price is derived from the
    /// discount so the pricing page and checkout cannot disagree.
    pub async fn add_price(&self, plan_id: &str, req: &NewPriceRequest) -> ApiResult<SubscriptionPlanPrice> {
        let plan = self.db.subscriptions().get_plan(plan_id).await?;
        kasir_core::validation::validate_duration_months(req.duration_months)?;
        kasir_core::validation::validate_price("original_price", req.original_price)?;
        kasir_core::validation::validate_bps("discount_percentage", req.discount_percentage.saturating_mul(100))?;

        // Both operands are bounded above, so the product fits in i64.
        let discount = req.original_price * req.discount_percentage / 100;
        let now = Utc::now();
        let price = SubscriptionPlanPrice {
            id: generate_id(),
            plan_id: plan.id.clone(),
            duration_type: req.duration_type,
            duration_months: req.duration_months,
            original_price: req.original_price,
            final_price: req.original_price - discount,
            discount_percentage: req.discount_percentage,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.db.subscriptions().insert_price(&price).await?;
        info!(plan = %plan.slug, months = price.duration_months, "Plan price added");
        Ok(price)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn history(&self, user: &User) -> ApiResult<Vec<UserSubscription>> {
        Ok(self.db.subscriptions().history_for_user(&user.id).await?)
    }

    pub async fn trial_status(&self, user: &User, now: DateTime<Utc>) -> ApiResult<TrialStatus> {
        let history = self.db.subscriptions().history_for_user(&user.id).await?;
        Ok(TrialStatus::from_history(&history, now))
    }

    pub async fn current(&self, user: &User, now: DateTime<Utc>) -> ApiResult<CurrentSubscription> {
        let history = self.db.subscriptions().history_for_user(&user.id).await?;
        let pending = history
            .iter()
            .find(|s| s.status == SubscriptionStatus::PendingPayment)
            .cloned();

        let Some(active) = current_active(&history, now).cloned() else {
            return Ok(CurrentSubscription {
                subscription: None,
                plan: None,
                days_remaining: 0,
                expires_soon_days: None,
                pending,
            });
        };

        let plan = self.db.subscriptions().get_plan(&active.plan_id).await?;
        Ok(CurrentSubscription {
            days_remaining: active.days_remaining(now),
            expires_soon_days: active.expiry_warning(now),
            plan: Some(plan),
            subscription: Some(active),
            pending,
        })
    }

    /// Status page polled by the dashboard after checkout.
    pub async fn payment_status(&self, user: &User, code: &str) -> ApiResult<PaymentStatus> {
        let subscription = self.require_by_code(code).await?;
        if subscription.user_id != user.id && user.role != kasir_core::Role::SuperAdmin {
            return Err(ApiError::not_found("Subscription", code));
        }
        let payments = self.db.subscriptions().payments_for(&subscription.id).await?;
        Ok(PaymentStatus {
            subscription_code: subscription.subscription_code.clone(),
            status: subscription.status,
            subscription,
            payments,
        })
    }

    // =========================================================================
    // Purchase
    // =========================================================================

    /// Starts a subscription. Trials activate at once; paid plans wait for
    /// the payment gateway.
    pub async fn subscribe(
        &self,
        user: &User,
        plan_id: &str,
        price_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<UserSubscription> {
        if user.role.is_employee() {
            return Err(ApiError::forbidden("Only business owners can subscribe"));
        }

        let missing = user.missing_profile_fields();
        if !missing.is_empty() {
            return Err(CoreError::ProfileIncomplete { missing }.into());
        }

        let history = self.db.subscriptions().history_for_user(&user.id).await?;
        // An active row past its end date is merely awaiting the expiry sweep.
        let open: Vec<UserSubscription> = history
            .iter()
            .filter(|s| s.status.is_open())
            .filter(|s| !(s.status == SubscriptionStatus::Active && s.ends_at <= now))
            .cloned()
            .collect();
        ensure_no_open_subscription(&open)?;

        let plan = self.db.subscriptions().get_plan(plan_id).await?;
        let price = self.db.subscriptions().get_price(price_id).await?;
        let trial = TrialStatus::from_history(&history, now);
        let new = plan_subscription(&plan, &price, now, trial.has_used_trial)?;

        let subscription = if new.status == SubscriptionStatus::Active {
            self.db
                .subscriptions()
                .insert_active(&user.id, &new, &[], SubscriptionStatus::Cancelled, now)
                .await?
        } else {
            self.db.subscriptions().insert_pending(&user.id, &new, now).await?
        };

        self.audit(
            &user.id,
            "subscription.subscribe",
            &subscription,
            json!({ "plan": plan.slug, "amount": subscription.amount_paid }),
        )
        .await;
        Ok(subscription)
    }

    /// Loads the pieces an upgrade needs and prices it.
    async fn quote(
        &self,
        user: &User,
        plan_id: &str,
        price_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<(Vec<UserSubscription>, UserSubscription, SubscriptionPlan, UpgradeQuote)> {
        let history = self.db.subscriptions().history_for_user(&user.id).await?;
        let current = current_active(&history, now)
            .cloned()
            .ok_or(CoreError::NoActiveSubscription)?;
        let current_plan = self.db.subscriptions().get_plan(&current.plan_id).await?;
        let target_plan = self.db.subscriptions().get_plan(plan_id).await?;
        let target_price = self.db.subscriptions().get_price(price_id).await?;

        let quote = upgrade_quote(&current, &current_plan, &target_plan, &target_price, now)?;
        Ok((history, current, target_plan, quote))
    }

    pub async fn upgrade_options(
        &self,
        user: &User,
        plan_id: &str,
        price_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<UpgradeOptions> {
        let (_, _, target_plan, quote) = self.quote(user, plan_id, price_id, now).await?;
        let downgrade_issues = if quote.is_downgrade {
            LimitsService::new(self.db.clone())
                .downgrade_issues(&user.id, &target_plan)
                .await?
        } else {
            Vec::new()
        };
        Ok(UpgradeOptions {
            can_downgrade: downgrade_issues.is_empty(),
            downgrade_issues,
            quote,
        })
    }

    /// Switches plan or renews early.
    pub async fn upgrade(
        &self,
        user: &User,
        plan_id: &str,
        price_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<UpgradeOutcome> {
        if user.role.is_employee() {
            return Err(ApiError::forbidden("Only business owners can change plans"));
        }

        let (history, current, target_plan, quote) = self.quote(user, plan_id, price_id, now).await?;

        if let Some(pending) = history
            .iter()
            .find(|s| s.status == SubscriptionStatus::PendingPayment)
        {
            return Err(CoreError::SubscriptionExists {
                code: pending.subscription_code.clone(),
                status: pending.status.as_str().to_string(),
            }
            .into());
        }

        if quote.is_downgrade {
            let issues = LimitsService::new(self.db.clone())
                .downgrade_issues(&user.id, &target_plan)
                .await?;
            if !issues.is_empty() {
                return Err(CoreError::DowngradeBlocked { issues }.into());
            }
        }

        let requires_payment = quote.amount_to_pay.is_positive();
        let new = NewSubscription {
            plan_id: target_plan.id.clone(),
            plan_price_id: quote.target_price_id.clone(),
            status: if requires_payment {
                SubscriptionStatus::PendingPayment
            } else {
                SubscriptionStatus::Active
            },
            amount_paid: quote.amount_to_pay,
            starts_at: now,
            ends_at: quote.new_ends_at,
            trial_ends_at: None,
            is_trial: false,
        };

        let subscription = if requires_payment {
            let extension = pending_upgrade_extension(&current, now);
            self.db
                .subscriptions()
                .insert_pending_upgrade(
                    &user.id,
                    &new,
                    extension.map(|ends_at| (current.id.as_str(), ends_at)),
                    now,
                )
                .await?
        } else {
            self.db
                .subscriptions()
                .insert_active(
                    &user.id,
                    &new,
                    std::slice::from_ref(&current.id),
                    SubscriptionStatus::Upgraded,
                    now,
                )
                .await?
        };

        self.audit(
            &user.id,
            "subscription.upgrade",
            &subscription,
            json!({
                "from": current.subscription_code,
                "plan": target_plan.slug,
                "amount": quote.amount_to_pay,
                "bonus_days": quote.bonus_days,
            }),
        )
        .await;

        Ok(UpgradeOutcome {
            subscription,
            quote,
            requires_payment,
        })
    }

    /// Cancels an active or pending subscription. Without an id the newest
    /// open one is cancelled.
    pub async fn cancel(
        &self,
        user: &User,
        subscription_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ApiResult<UserSubscription> {
        let history = self.db.subscriptions().history_for_user(&user.id).await?;
        let target = match subscription_id {
            Some(id) => history.into_iter().find(|s| s.id == id && s.status.is_open()),
            None => history.into_iter().find(|s| s.status.is_open()),
        };
        let mut subscription =
            target.ok_or_else(|| ApiError::not_found("Subscription", subscription_id.unwrap_or("open")))?;

        let expected = subscription.status;
        subscription.cancel(now)?;
        subscription.updated_at = now;
        self.db.subscriptions().save(&subscription, expected).await?;

        self.audit(&user.id, "subscription.cancel", &subscription, json!({ "previous": expected.as_str() }))
            .await;
        Ok(subscription)
    }

    /// Replaces the current plan with the one-time trial.
    pub async fn downgrade_to_trial(&self, user: &User, now: DateTime<Utc>) -> ApiResult<UserSubscription> {
        let trial_plan = self
            .db
            .subscriptions()
            .get_plan_by_slug(TRIAL_PLAN_SLUG)
            .await?
            .ok_or_else(|| ApiError::not_found("SubscriptionPlan", TRIAL_PLAN_SLUG))?;
        let trial_price = self
            .db
            .subscriptions()
            .prices_for_plan(&trial_plan.id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found("SubscriptionPlanPrice", TRIAL_PLAN_SLUG))?;

        let history = self.db.subscriptions().history_for_user(&user.id).await?;
        let current = current_active(&history, now);
        let new = plan_trial_downgrade(current, &history, &trial_plan, &trial_price, now)?;

        let issues = LimitsService::new(self.db.clone())
            .downgrade_issues(&user.id, &trial_plan)
            .await?;
        if !issues.is_empty() {
            return Err(CoreError::DowngradeBlocked { issues }.into());
        }

        let replace: Vec<String> = history
            .iter()
            .filter(|s| s.status.is_open())
            .map(|s| s.id.clone())
            .collect();
        let subscription = self
            .db
            .subscriptions()
            .insert_active(&user.id, &new, &replace, SubscriptionStatus::Cancelled, now)
            .await?;

        self.audit(&user.id, "subscription.downgrade_to_trial", &subscription, json!({ "replaced": replace }))
            .await;
        Ok(subscription)
    }

    // =========================================================================
    // Payment
    // =========================================================================

    async fn require_by_code(&self, code: &str) -> ApiResult<UserSubscription> {
        self.db
            .subscriptions()
            .get_by_code(code)
            .await?
            .ok_or_else(|| ApiError::not_found("Subscription", code))
    }

    /// Settles a successful payment. Safe to call again for a subscription
    /// that was already settled.
    ///
    /// Money for a subscription that was cancelled, expired or replaced
    /// before the payment landed is recorded as `needs_review` and the
    /// subscription is returned unchanged.
    pub async fn confirm_payment(
        &self,
        code: &str,
        payment_method: &str,
        gateway_payment_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ApiResult<UserSubscription> {
        let paid = self.require_by_code(code).await?;
        match paid.status {
            SubscriptionStatus::PendingPayment => {}
            SubscriptionStatus::Active | SubscriptionStatus::Completed => {
                info!(code = %code, status = paid.status.as_str(), "Payment already settled");
                return Ok(paid);
            }
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired | SubscriptionStatus::Upgraded => {
                let recorded = self
                    .db
                    .subscriptions()
                    .record_unmatched_payment(&paid, payment_method, gateway_payment_id, now)
                    .await?;
                if recorded {
                    self.audit(
                        &paid.user_id,
                        "subscription.payment_unmatched",
                        &paid,
                        json!({
                            "method": payment_method,
                            "gateway_payment_id": gateway_payment_id,
                            "status": paid.status.as_str(),
                        }),
                    )
                    .await;
                }
                return Ok(paid);
            }
        }

        let others = self.db.subscriptions().history_for_user(&paid.user_id).await?;
        let settlement = settle_payment(&paid, &others)?;
        let effective = self
            .db
            .subscriptions()
            .apply_settlement(&paid, &settlement, payment_method, gateway_payment_id, now)
            .await?;

        self.audit(
            &paid.user_id,
            "subscription.payment_confirmed",
            &paid,
            json!({
                "method": payment_method,
                "gateway_payment_id": gateway_payment_id,
                "effective": effective.subscription_code,
            }),
        )
        .await;
        Ok(effective)
    }

    /// Closes a pending subscription whose payment failed. Anything else is
    /// left alone.
    pub async fn mark_failed(&self, code: &str, reason: &str, now: DateTime<Utc>) -> ApiResult<UserSubscription> {
        let mut subscription = self.require_by_code(code).await?;
        if subscription.status != SubscriptionStatus::PendingPayment {
            info!(code = %code, status = subscription.status.as_str(), "Ignoring failure for settled subscription");
            return Ok(subscription);
        }

        subscription.transition(SubscriptionStatus::Cancelled, "mark payment failed")?;
        subscription.append_note(&format!("Payment failed: {}", reason));
        subscription.updated_at = now;
        self.db
            .subscriptions()
            .save(&subscription, SubscriptionStatus::PendingPayment)
            .await?;

        warn!(code = %code, reason = %reason, "Subscription payment failed");
        Ok(subscription)
    }

    /// Audit failures never fail the operation being audited.
    async fn audit(&self, user_id: &str, action: &str, subscription: &UserSubscription, details: serde_json::Value) {
        if let Err(e) = self
            .db
            .audit()
            .record(Some(user_id), action, "user_subscription", &subscription.id, Some(&details))
            .await
        {
            warn!(action = %action, "Failed to write audit log: {}", e);
        }
    }
}
