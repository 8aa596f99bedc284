//! # Background Sweep
//!
//! Periodic housekeeping spawned by `main`.
//!
//! ## One Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. expire_due          active subscriptions past ends_at → expired    │
//! │  2. otp cleanup         drop expired verification codes               │
//! │  3. reminders           enqueue WhatsApp text at -7 -3 -1 0 +1 +3 +7   │
//! │                         days from expiry, once per subscription+offset │
//! │  4. outbox cleanup      drop messages delivered over 30 days ago       │
//! │  5. delivery            hand pending outbox rows to the sender         │
//! │                         ok → mark_sent    err → attempts += 1          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! A failing step is logged and the remaining steps still run.

use std::future::Future;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use kasir_core::messages::{reminder_message, reminder_offset, ReminderContext};
use kasir_core::{MessageKind, Money};
use kasir_db::Database;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::ApiResult;

/// Delivered messages are kept this long for support lookups.
const SENT_RETENTION_DAYS: i64 = 30;

/// Reminder candidates are fetched this far around `now`; the exact offset
/// is decided per row on Jakarta calendar days.
const REMINDER_WINDOW_DAYS: i64 = 8;

/// Outbox rows handed to the sender per pass.
const DELIVERY_BATCH: u32 = 50;

// =============================================================================
// Sender
// =============================================================================

/// Delivers one WhatsApp text. The vendor integration lives behind this.
pub trait MessageSender: Send + Sync {
    fn send(&self, phone: &str, message: &str) -> impl Future<Output = Result<(), String>> + Send;
}

/// Writes messages to the log instead of a WhatsApp gateway.
#[derive(Debug, Clone, Default)]
pub struct LogSender;

impl MessageSender for LogSender {
    async fn send(&self, phone: &str, message: &str) -> Result<(), String> {
        info!(phone = %phone, chars = message.chars().count(), "WhatsApp message (log sender)");
        debug!(phone = %phone, "{}", message);
        Ok(())
    }
}

// =============================================================================
// Sweep
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub subscriptions_expired: u64,
    pub otp_removed: u64,
    pub reminders_sent: u64,
    pub reminders_skipped: u64,
    pub outbox_cleaned: u64,
    pub messages_delivered: u64,
    pub messages_failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: u64,
    pub failed: u64,
}

pub struct SweepService<S> {
    db: Database,
    sender: S,
    dashboard_url: String,
}

impl<S: MessageSender> SweepService<S> {
    pub fn new(db: Database, sender: S, frontend_url: &str) -> Self {
        SweepService {
            db,
            sender,
            dashboard_url: format!("{}/subscription", frontend_url.trim_end_matches('/')),
        }
    }

    /// Runs passes every `every` until `shutdown` flips to true.
    pub async fn run(self, every: StdDuration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = every.as_secs(), "Sweep task starting");

        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.run_once(Utc::now()).await;
                    if report != SweepReport::default() {
                        info!(?report, "Sweep pass finished");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Sweep task shutting down");
                        break;
                    }
                }
            }
        }

        info!("Sweep task stopped");
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.db.subscriptions().expire_due(now).await {
            Ok(n) => report.subscriptions_expired = n,
            Err(e) => error!("Failed to expire subscriptions: {}", e),
        }
        match self.db.otp().cleanup_expired(now).await {
            Ok(n) => report.otp_removed = n,
            Err(e) => error!("Failed to clean up OTP codes: {}", e),
        }
        match self.enqueue_reminders(now).await {
            Ok((sent, skipped)) => {
                report.reminders_sent = sent;
                report.reminders_skipped = skipped;
            }
            Err(e) => error!("Failed to enqueue reminders: {}", e),
        }
        match self
            .db
            .outbox()
            .cleanup_sent(now - Duration::days(SENT_RETENTION_DAYS))
            .await
        {
            Ok(n) => report.outbox_cleaned = n,
            Err(e) => error!("Failed to clean up outbox: {}", e),
        }
        match self.deliver_pending(DELIVERY_BATCH).await {
            Ok(delivery) => {
                report.messages_delivered = delivery.delivered;
                report.messages_failed = delivery.failed;
            }
            Err(e) => error!("Failed to deliver outbox: {}", e),
        }

        report
    }

    /// Queues due reminders. Returns `(sent, skipped)`; a reminder is
    /// skipped when the owner has no phone or it was already queued.
    pub async fn enqueue_reminders(&self, now: DateTime<Utc>) -> ApiResult<(u64, u64)> {
        let window = Duration::days(REMINDER_WINDOW_DAYS);
        let candidates = self
            .db
            .subscriptions()
            .reminder_candidates(now - window, now + window)
            .await?;

        let (mut sent, mut skipped) = (0, 0);
        for candidate in &candidates {
            let Some(offset) = reminder_offset(candidate.ends_at, candidate.status, now) else {
                continue;
            };
            let Some(phone) = candidate.phone.as_deref().filter(|p| !p.is_empty()) else {
                debug!(user_id = %candidate.user_id, "No phone for reminder");
                skipped += 1;
                continue;
            };

            let reference = format!("{}:{}", candidate.subscription_id, offset);
            if self.db.outbox().exists(MessageKind::Reminder, &reference).await? {
                skipped += 1;
                continue;
            }

            let text = reminder_message(
                &ReminderContext {
                    owner_name: &candidate.user_name,
                    plan_name: &candidate.plan_name,
                    ends_at: candidate.ends_at,
                    amount_paid: Money::from_rupiah(candidate.amount_paid),
                    dashboard_url: &self.dashboard_url,
                },
                offset,
            );
            self.db
                .outbox()
                .enqueue(phone, &text, MessageKind::Reminder, Some(&reference))
                .await?;
            info!(
                code = %candidate.subscription_code,
                offset,
                "Subscription reminder queued"
            );
            sent += 1;
        }
        Ok((sent, skipped))
    }

    /// Hands up to `limit` pending outbox rows to the sender.
    pub async fn deliver_pending(&self, limit: u32) -> ApiResult<DeliveryReport> {
        let pending = self.db.outbox().get_pending(limit).await?;
        let mut report = DeliveryReport::default();

        for message in &pending {
            match self.sender.send(&message.phone, &message.message).await {
                Ok(()) => {
                    self.db.outbox().mark_sent(&message.id).await?;
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        id = %message.id,
                        attempts = message.attempts + 1,
                        "WhatsApp delivery failed: {}",
                        e
                    );
                    self.db.outbox().mark_failed(&message.id, &e).await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;
    use kasir_core::subscription::{NewSubscription, SubscriptionStatus};
    use kasir_core::Role;
    use kasir_db::repository::outbox::MAX_DELIVERY_ATTEMPTS;

    struct FailingSender;

    impl MessageSender for FailingSender {
        async fn send(&self, _phone: &str, _message: &str) -> Result<(), String> {
            Err("gateway down".to_string())
        }
    }

    async fn subscription_ending(db: &Database, user_id: &str, ends_at: DateTime<Utc>) -> String {
        let (plan, price) = testing::plan(db, "basic", 1, [1, 100, 5], 99_000).await;
        let new = NewSubscription {
            plan_id: plan.id,
            plan_price_id: price.id,
            status: SubscriptionStatus::Active,
            amount_paid: Money::from_rupiah(99_000),
            starts_at: ends_at - Duration::days(30),
            ends_at,
            trial_ends_at: None,
            is_trial: false,
        };
        db.subscriptions()
            .insert_active(user_id, &new, &[], SubscriptionStatus::Cancelled, Utc::now())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_reminder_queued_once_and_delivered() {
        let db = testing::db().await;
        let owner = testing::user(&db, Role::Owner, true).await;
        let now = Utc::now();
        let id = subscription_ending(&db, &owner.id, now + Duration::days(3)).await;
        let sweep = SweepService::new(db.clone(), LogSender, "https://kasir.example.id/");

        let first = sweep.run_once(now).await;
        assert_eq!(first.reminders_sent, 1);
        assert_eq!(first.messages_delivered, 1);
        assert!(db.outbox().exists(MessageKind::Reminder, &format!("{}:-3", id)).await.unwrap());

        let second = sweep.run_once(now).await;
        assert_eq!(second.reminders_sent, 0);
        assert_eq!(second.reminders_skipped, 1);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_owner_without_phone_skipped() {
        let db = testing::db().await;
        let owner = testing::user(&db, Role::Owner, false).await;
        let now = Utc::now();
        subscription_ending(&db, &owner.id, now + Duration::days(1)).await;

        let (sent, skipped) = SweepService::new(db, LogSender, "http://localhost")
            .enqueue_reminders(now)
            .await
            .unwrap();
        assert_eq!((sent, skipped), (0, 1));
    }

    #[tokio::test]
    async fn test_expires_due_subscription() {
        let db = testing::db().await;
        let owner = testing::user(&db, Role::Owner, true).await;
        let id = subscription_ending(&db, &owner.id, testing::days_ago(2)).await;

        let report = SweepService::new(db.clone(), LogSender, "http://localhost")
            .run_once(Utc::now())
            .await;
        assert_eq!(report.subscriptions_expired, 1);
        let stored = db.subscriptions().get_by_id(&id).await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn test_expiry_keeps_grace_while_renewal_is_pending() {
        use crate::services::SubscriptionService;
        use kasir_core::subscription::{owner_access, AccessDecision};

        let db = testing::db().await;
        let owner = testing::user(&db, Role::Owner, true).await;
        let now = Utc::now();
        subscription_ending(&db, &owner.id, testing::days_ago(1)).await;
        let (plan, price) = testing::plan(&db, "professional", 2, [3, 500, 20], 250_000).await;
        SubscriptionService::new(db.clone())
            .subscribe(&owner, &plan.id, &price.id, now)
            .await
            .unwrap();

        let report = SweepService::new(db.clone(), LogSender, "http://localhost")
            .run_once(now)
            .await;
        assert_eq!(report.subscriptions_expired, 1);

        let history = db.subscriptions().history_for_user(&owner.id).await.unwrap();
        assert!(matches!(
            owner_access(&history, now),
            AccessDecision::Allowed { in_grace_period: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_delivery_retries_until_limit() {
        let db = testing::db().await;
        db.outbox()
            .enqueue("6281234567890", "halo", MessageKind::Otp, None)
            .await
            .unwrap();
        let sweep = SweepService::new(db.clone(), FailingSender, "http://localhost");

        for _ in 0..MAX_DELIVERY_ATTEMPTS {
            let report = sweep.deliver_pending(10).await.unwrap();
            assert_eq!(report.failed, 1);
        }
        assert_eq!(sweep.deliver_pending(10).await.unwrap(), DeliveryReport::default());
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }
}
