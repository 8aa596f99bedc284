//! # Subscription Repository
//!
//! Plans, plan prices, user subscriptions and subscription payments.
//!
//! ## Activation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settle_payment() (kasir-core) decides ──► Settlement                  │
//! │                                                │                        │
//! │  apply_settlement()  ── one transaction ───────┘                        │
//! │  ├── paid row: pending_payment → active | completed  (guarded)         │
//! │  ├── Renewal:     extend the running subscription                      │
//! │  ├── Activation:  other active rows → upgraded                         │
//! │  ├── businesses of the owner → point at the effective subscription     │
//! │  └── INSERT subscription_payments (status 'paid')                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guard on `status = 'pending_payment'` makes a replayed confirmation
//! fail with `Conflict` instead of activating twice.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::business::repoint_owner_businesses;
use super::{generate_id, random_code};
use crate::error::{DbError, DbResult};
use kasir_core::subscription::{
    subscription_code, NewSubscription, Settlement, SubscriptionPayment, SubscriptionPlan,
    SubscriptionPlanPrice, SubscriptionStatus, UserSubscription,
};

/// Payment status for money that arrived after its subscription closed.
pub const PAYMENT_NEEDS_REVIEW: &str = "needs_review";

const SELECT_PLAN: &str = r#"
    SELECT id, name, slug, description, max_businesses, max_outlets, max_products,
           max_employees, has_reports_access, has_advanced_reports, has_kitchen_access,
           has_tables_access, has_attendance_access, has_inventory_access,
           has_promo_access, has_stock_transfer_access, has_self_service_access,
           has_online_integration, has_api_access, has_multi_location, features,
           is_active, is_popular, cta_text, sort_order, created_at, updated_at
    FROM subscription_plans
"#;

const SELECT_PRICE: &str = r#"
    SELECT id, plan_id, duration_type, duration_months, original_price, final_price,
           discount_percentage, is_active, created_at, updated_at
    FROM subscription_plan_prices
"#;

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT id, user_id, plan_id, plan_price_id, subscription_code, status, amount_paid,
           starts_at, ends_at, trial_ends_at, is_trial, payment_method,
           gateway_payment_id, paid_at, notes, created_at, updated_at
    FROM user_subscriptions
"#;

/// Owner subscription joined with what a reminder message needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReminderCandidate {
    pub subscription_id: String,
    pub subscription_code: String,
    pub status: SubscriptionStatus,
    pub ends_at: DateTime<Utc>,
    pub amount_paid: i64,
    pub user_id: String,
    pub user_name: String,
    pub phone: Option<String>,
    pub plan_name: String,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: SqlitePool,
}

impl SubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SubscriptionRepository { pool }
    }

    // =========================================================================
    // Plans
    // =========================================================================

    pub async fn insert_plan(&self, plan: &SubscriptionPlan) -> DbResult<()> {
        debug!(slug = %plan.slug, "Inserting subscription plan");

        sqlx::query(
            r#"
            INSERT INTO subscription_plans (
                id, name, slug, description, max_businesses, max_outlets, max_products,
                max_employees, has_reports_access, has_advanced_reports, has_kitchen_access,
                has_tables_access, has_attendance_access, has_inventory_access,
                has_promo_access, has_stock_transfer_access, has_self_service_access,
                has_online_integration, has_api_access, has_multi_location, features,
                is_active, is_popular, cta_text, sort_order, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27
            )
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(&plan.slug)
        .bind(&plan.description)
        .bind(plan.max_businesses)
        .bind(plan.max_outlets)
        .bind(plan.max_products)
        .bind(plan.max_employees)
        .bind(plan.has_reports_access)
        .bind(plan.has_advanced_reports)
        .bind(plan.has_kitchen_access)
        .bind(plan.has_tables_access)
        .bind(plan.has_attendance_access)
        .bind(plan.has_inventory_access)
        .bind(plan.has_promo_access)
        .bind(plan.has_stock_transfer_access)
        .bind(plan.has_self_service_access)
        .bind(plan.has_online_integration)
        .bind(plan.has_api_access)
        .bind(plan.has_multi_location)
        .bind(&plan.features)
        .bind(plan.is_active)
        .bind(plan.is_popular)
        .bind(&plan.cta_text)
        .bind(plan.sort_order)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("slug", &plan.slug),
            other => other,
        })?;

        Ok(())
    }

    /// Active plans in display order.
    pub async fn list_active_plans(&self) -> DbResult<Vec<SubscriptionPlan>> {
        let plans = sqlx::query_as::<_, SubscriptionPlan>(&format!(
            "{SELECT_PLAN} WHERE is_active = 1 ORDER BY sort_order ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(plans)
    }

    pub async fn get_plan(&self, id: &str) -> DbResult<SubscriptionPlan> {
        sqlx::query_as::<_, SubscriptionPlan>(&format!("{SELECT_PLAN} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("SubscriptionPlan", id))
    }

    pub async fn get_plan_by_slug(&self, slug: &str) -> DbResult<Option<SubscriptionPlan>> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(&format!("{SELECT_PLAN} WHERE slug = ?1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    // =========================================================================
    // Prices
    // =========================================================================

    /// Inserts a plan price.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - plan already has a price for this duration
    pub async fn insert_price(&self, price: &SubscriptionPlanPrice) -> DbResult<()> {
        debug!(plan_id = %price.plan_id, months = price.duration_months, "Inserting plan price");

        sqlx::query(
            r#"
            INSERT INTO subscription_plan_prices (
                id, plan_id, duration_type, duration_months, original_price, final_price,
                discount_percentage, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&price.id)
        .bind(&price.plan_id)
        .bind(price.duration_type)
        .bind(price.duration_months)
        .bind(price.original_price)
        .bind(price.final_price)
        .bind(price.discount_percentage)
        .bind(price.is_active)
        .bind(price.created_at)
        .bind(price.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => {
                DbError::duplicate("duration_months", price.duration_months.to_string())
            }
            other => other,
        })?;

        Ok(())
    }

    pub async fn prices_for_plan(&self, plan_id: &str) -> DbResult<Vec<SubscriptionPlanPrice>> {
        let prices = sqlx::query_as::<_, SubscriptionPlanPrice>(&format!(
            "{SELECT_PRICE} WHERE plan_id = ?1 AND is_active = 1 ORDER BY duration_months ASC"
        ))
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(prices)
    }

    pub async fn get_price(&self, id: &str) -> DbResult<SubscriptionPlanPrice> {
        sqlx::query_as::<_, SubscriptionPlanPrice>(&format!("{SELECT_PRICE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("SubscriptionPlanPrice", id))
    }

    // =========================================================================
    // User subscriptions
    // =========================================================================

    /// `SUB-` + 10 random characters, unused so far.
    async fn generate_code(conn: &mut SqliteConnection) -> DbResult<String> {
        loop {
            let candidate = subscription_code(&random_code(10));
            let exists: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM user_subscriptions WHERE subscription_code = ?1",
            )
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await?;
            if exists == 0 {
                return Ok(candidate);
            }
        }
    }

    async fn insert_row(
        conn: &mut SqliteConnection,
        user_id: &str,
        new: &NewSubscription,
        now: DateTime<Utc>,
    ) -> DbResult<UserSubscription> {
        let subscription = UserSubscription {
            id: generate_id(),
            user_id: user_id.to_string(),
            plan_id: new.plan_id.clone(),
            plan_price_id: new.plan_price_id.clone(),
            subscription_code: Self::generate_code(conn).await?,
            status: new.status,
            amount_paid: new.amount_paid.rupiah(),
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            trial_ends_at: new.trial_ends_at,
            is_trial: new.is_trial,
            payment_method: None,
            gateway_payment_id: None,
            paid_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO user_subscriptions (
                id, user_id, plan_id, plan_price_id, subscription_code, status, amount_paid,
                starts_at, ends_at, trial_ends_at, is_trial, payment_method,
                gateway_payment_id, paid_at, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.user_id)
        .bind(&subscription.plan_id)
        .bind(&subscription.plan_price_id)
        .bind(&subscription.subscription_code)
        .bind(subscription.status)
        .bind(subscription.amount_paid)
        .bind(subscription.starts_at)
        .bind(subscription.ends_at)
        .bind(subscription.trial_ends_at)
        .bind(subscription.is_trial)
        .bind(&subscription.payment_method)
        .bind(&subscription.gateway_payment_id)
        .bind(subscription.paid_at)
        .bind(&subscription.notes)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(subscription)
    }

    /// Inserts a subscription awaiting payment.
    pub async fn insert_pending(
        &self,
        user_id: &str,
        new: &NewSubscription,
        now: DateTime<Utc>,
    ) -> DbResult<UserSubscription> {
        let mut conn = self.pool.acquire().await?;
        let subscription = Self::insert_row(&mut conn, user_id, new, now).await?;
        info!(code = %subscription.subscription_code, user_id = %user_id, "Subscription created");
        Ok(subscription)
    }

    /// Inserts a paid upgrade awaiting payment and, when given, pushes the
    /// running subscription's end date out so it survives the payment window.
    pub async fn insert_pending_upgrade(
        &self,
        user_id: &str,
        new: &NewSubscription,
        extend: Option<(&str, DateTime<Utc>)>,
        now: DateTime<Utc>,
    ) -> DbResult<UserSubscription> {
        let mut tx = self.pool.begin().await?;

        let subscription = Self::insert_row(&mut tx, user_id, new, now).await?;
        if let Some((current_id, ends_at)) = extend {
            debug!(subscription_id = %current_id, ends_at = %ends_at, "Extending current subscription");
            set_ends_at(&mut tx, current_id, ends_at, now).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(code = %subscription.subscription_code, "Upgrade awaiting payment");
        Ok(subscription)
    }

    /// Inserts an immediately active subscription (trial or free upgrade),
    /// moves `replace_ids` to `replaced_status` and repoints the owner's
    /// businesses, in one transaction.
    pub async fn insert_active(
        &self,
        user_id: &str,
        new: &NewSubscription,
        replace_ids: &[String],
        replaced_status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> DbResult<UserSubscription> {
        let mut tx = self.pool.begin().await?;

        let subscription = Self::insert_row(&mut tx, user_id, new, now).await?;
        for id in replace_ids {
            sqlx::query(
                r#"
                UPDATE user_subscriptions SET status = ?2, updated_at = ?3
                WHERE id = ?1 AND status IN ('active', 'pending_payment')
                "#,
            )
            .bind(id)
            .bind(replaced_status)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        repoint_owner_businesses(&mut tx, user_id, &subscription.id, subscription.ends_at).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            code = %subscription.subscription_code,
            replaced = replace_ids.len(),
            "Subscription activated"
        );
        Ok(subscription)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<UserSubscription> {
        sqlx::query_as::<_, UserSubscription>(&format!("{SELECT_SUBSCRIPTION} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("UserSubscription", id))
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<UserSubscription>> {
        let subscription = sqlx::query_as::<_, UserSubscription>(&format!(
            "{SELECT_SUBSCRIPTION} WHERE subscription_code = ?1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    /// Every subscription of the user, newest first.
    pub async fn history_for_user(&self, user_id: &str) -> DbResult<Vec<UserSubscription>> {
        let history = sqlx::query_as::<_, UserSubscription>(&format!(
            "{SELECT_SUBSCRIPTION} WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }

    /// Writes status, dates, payment fields and notes, provided the stored
    /// status is still `expected`.
    pub async fn save(&self, subscription: &UserSubscription, expected: SubscriptionStatus) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_subscriptions SET
                status = ?2, ends_at = ?3, payment_method = ?4, gateway_payment_id = ?5,
                paid_at = ?6, notes = ?7, updated_at = ?8
            WHERE id = ?1 AND status = ?9
            "#,
        )
        .bind(&subscription.id)
        .bind(subscription.status)
        .bind(subscription.ends_at)
        .bind(&subscription.payment_method)
        .bind(&subscription.gateway_payment_id)
        .bind(subscription.paid_at)
        .bind(&subscription.notes)
        .bind(subscription.updated_at)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict(
                "UserSubscription",
                &subscription.subscription_code,
                format!("expected status {}", expected.as_str()),
            ));
        }
        Ok(())
    }

    /// Persists a successful payment. Returns the subscription the owner's
    /// businesses now point at.
    pub async fn apply_settlement(
        &self,
        paid: &UserSubscription,
        settlement: &Settlement,
        payment_method: &str,
        gateway_payment_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<UserSubscription> {
        debug!(code = %paid.subscription_code, settlement = ?settlement, "Applying settlement");

        let paid_status = match settlement {
            Settlement::Renewal { .. } => SubscriptionStatus::Completed,
            Settlement::Activation { .. } => SubscriptionStatus::Active,
        };

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_subscriptions SET
                status = ?2, payment_method = ?3, gateway_payment_id = ?4,
                paid_at = ?5, updated_at = ?5
            WHERE id = ?1 AND status = 'pending_payment'
            "#,
        )
        .bind(&paid.id)
        .bind(paid_status)
        .bind(payment_method)
        .bind(gateway_payment_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict(
                "UserSubscription",
                &paid.subscription_code,
                "payment already settled",
            ));
        }

        let (effective_id, effective_ends_at) = match settlement {
            Settlement::Renewal { extend_id, new_ends_at } => {
                set_ends_at(&mut tx, extend_id, *new_ends_at, now).await?;
                (extend_id.as_str(), *new_ends_at)
            }
            Settlement::Activation { supersede_ids } => {
                for id in supersede_ids {
                    sqlx::query(
                        r#"
                        UPDATE user_subscriptions SET status = 'upgraded', updated_at = ?2
                        WHERE id = ?1 AND status = 'active'
                        "#,
                    )
                    .bind(id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                (paid.id.as_str(), paid.ends_at)
            }
        };

        repoint_owner_businesses(&mut tx, &paid.user_id, effective_id, effective_ends_at).await?;

        sqlx::query(
            r#"
            INSERT INTO subscription_payments (
                id, user_subscription_id, payment_code, payment_method, amount, status,
                gateway_payment_id, paid_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'paid', ?6, ?7, ?7)
            "#,
        )
        .bind(generate_id())
        .bind(&paid.id)
        .bind(&paid.subscription_code)
        .bind(payment_method)
        .bind(paid.amount_paid)
        .bind(gateway_payment_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let effective = sqlx::query_as::<_, UserSubscription>(&format!(
            "{SELECT_SUBSCRIPTION} WHERE id = ?1"
        ))
        .bind(effective_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            code = %paid.subscription_code,
            effective = %effective.subscription_code,
            ends_at = %effective.ends_at,
            "Subscription payment settled"
        );
        Ok(effective)
    }

    /// Records money received for a subscription that can no longer be
    /// activated (cancelled, expired, replaced). The row is stored with
    /// status `needs_review` and nothing else changes. A redelivered
    /// notification for the same gateway payment is recorded once; returns
    /// whether a row was inserted.
    pub async fn record_unmatched_payment(
        &self,
        subscription: &UserSubscription,
        payment_method: &str,
        gateway_payment_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_payments (
                id, user_subscription_id, payment_code, payment_method, amount, status,
                gateway_payment_id, paid_at, created_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8
            WHERE NOT EXISTS (
                SELECT 1 FROM subscription_payments
                WHERE user_subscription_id = ?2 AND status = ?6 AND gateway_payment_id IS ?7
            )
            "#,
        )
        .bind(generate_id())
        .bind(&subscription.id)
        .bind(&subscription.subscription_code)
        .bind(payment_method)
        .bind(subscription.amount_paid)
        .bind(PAYMENT_NEEDS_REVIEW)
        .bind(gateway_payment_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            warn!(
                code = %subscription.subscription_code,
                status = subscription.status.as_str(),
                "Payment received for a subscription that cannot be activated"
            );
        }
        Ok(inserted)
    }

    pub async fn payments_for(&self, subscription_id: &str) -> DbResult<Vec<SubscriptionPayment>> {
        let payments = sqlx::query_as::<_, SubscriptionPayment>(
            r#"
            SELECT id, user_subscription_id, payment_code, payment_method, amount, status,
                   gateway_payment_id, paid_at, created_at
            FROM subscription_payments
            WHERE user_subscription_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    // =========================================================================
    // Sweeps
    // =========================================================================

    /// Marks active subscriptions whose end date has passed as expired.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE user_subscriptions SET status = 'expired', updated_at = ?1
            WHERE status = 'active' AND ends_at <= ?1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            info!(expired, "Expired due subscriptions");
        }
        Ok(expired)
    }

    /// Active or expired subscriptions ending within `[from, to)`, with the
    /// owner's contact details.
    pub async fn reminder_candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<ReminderCandidate>> {
        let rows = sqlx::query_as::<_, ReminderCandidate>(
            r#"
            SELECT s.id AS subscription_id, s.subscription_code, s.status, s.ends_at, s.amount_paid,
                   u.id AS user_id, u.name AS user_name, u.phone, p.name AS plan_name
            FROM user_subscriptions s
            INNER JOIN users u ON u.id = s.user_id
            INNER JOIN subscription_plans p ON p.id = s.plan_id
            WHERE s.status IN ('active', 'expired')
              AND s.ends_at >= ?1 AND s.ends_at < ?2
            ORDER BY s.ends_at ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn set_ends_at(
    conn: &mut SqliteConnection,
    id: &str,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE user_subscriptions SET ends_at = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(ends_at)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("UserSubscription", id));
    }
    Ok(())
}
