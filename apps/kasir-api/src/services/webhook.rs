//! Midtrans payment notifications.
//!
//! ## Flow
//! ```text
//! raw body ──► parse ──► signature ──► status ──► subscription code
//!                │           │                          │
//!                ▼           ▼                          ▼
//!           200 ignored     401          Redis claim (SET NX EX) ──► settle / fail
//! ```
//! The gateway retries on anything but 2xx, so notifications we cannot act
//! on are acknowledged with 200. Processing errors release the claim and
//! answer 500 so the retry can succeed.

use chrono::{DateTime, Utc};
use kasir_core::otp::constant_time_eq;
use kasir_core::subscription::{subscription_code_from_order_id, SubscriptionStatus};
use kasir_db::Database;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::services::SubscriptionService;

/// Idempotency keys live for one day.
const CLAIM_TTL_SECS: u64 = 86_400;

/// Payload posted by Midtrans. Only the fields we act on.
#[derive(Debug, Clone, Deserialize)]
pub struct MidtransNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    #[serde(default)]
    pub signature_key: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Challenge,
    Failed,
    Pending,
}

/// Maps a Midtrans transaction status. Statuses we do not act on (refund,
/// authorize, ...) map to `None`.
pub fn map_status(transaction_status: &str, fraud_status: Option<&str>) -> Option<PaymentOutcome> {
    match transaction_status {
        "capture" => match fraud_status {
            Some("challenge") => Some(PaymentOutcome::Challenge),
            Some("accept") | None => Some(PaymentOutcome::Success),
            Some(_) => None,
        },
        "settlement" => Some(PaymentOutcome::Success),
        "cancel" | "deny" | "expire" => Some(PaymentOutcome::Failed),
        "pending" => Some(PaymentOutcome::Pending),
        _ => None,
    }
}

/// `hex(sha512(order_id + status_code + gross_amount + server_key))`
pub fn expected_signature(n: &MidtransNotification, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(n.order_id.as_bytes());
    hasher.update(n.status_code.as_bytes());
    hasher.update(n.gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn signature_valid(n: &MidtransNotification, server_key: &str) -> bool {
    let expected = expected_signature(n, server_key);
    constant_time_eq(
        expected.as_bytes(),
        n.signature_key.to_ascii_lowercase().as_bytes(),
    )
}

/// Body returned to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

impl WebhookAck {
    fn ok(message: impl Into<String>) -> Self {
        WebhookAck {
            success: true,
            message: message.into(),
        }
    }

    fn ignored(message: impl Into<String>) -> Self {
        WebhookAck {
            success: false,
            message: message.into(),
        }
    }
}

enum Claim {
    Acquired(Option<String>),
    Duplicate,
}

#[derive(Clone)]
pub struct WebhookService {
    db: Database,
    subscriptions: SubscriptionService,
    server_key: Option<String>,
    redis: Option<redis::Client>,
}

impl WebhookService {
    pub fn new(db: Database, server_key: Option<String>, redis: Option<redis::Client>) -> Self {
        WebhookService {
            subscriptions: SubscriptionService::new(db.clone()),
            db,
            server_key,
            redis,
        }
    }

    /// Handles one notification body.
    pub async fn handle(&self, body: &[u8], now: DateTime<Utc>) -> ApiResult<WebhookAck> {
        let notification: MidtransNotification = match serde_json::from_slice(body) {
            Ok(n) => n,
            Err(e) => {
                warn!("Unparsable Midtrans notification: {}", e);
                return Ok(WebhookAck::ignored("Invalid payload"));
            }
        };

        if let Some(key) = self.server_key.as_deref() {
            if !signature_valid(&notification, key) {
                warn!(order_id = %notification.order_id, "Midtrans signature mismatch");
                return Err(ApiError::unauthorized("Invalid signature"));
            }
        }

        let Some(outcome) = map_status(
            &notification.transaction_status,
            notification.fraud_status.as_deref(),
        ) else {
            info!(
                order_id = %notification.order_id,
                status = %notification.transaction_status,
                "Ignoring Midtrans status"
            );
            return Ok(WebhookAck::ok("Status ignored"));
        };

        let Some(code) = subscription_code_from_order_id(&notification.order_id) else {
            warn!(order_id = %notification.order_id, "Order id is not a subscription code");
            return Ok(WebhookAck::ignored("Unknown order"));
        };
        if self.db.subscriptions().get_by_code(&code).await?.is_none() {
            warn!(code = %code, "Notification for unknown subscription");
            return Ok(WebhookAck::ignored("Subscription not found"));
        }

        let claim_key = match self.claim(&notification).await {
            Claim::Acquired(key) => key,
            Claim::Duplicate => {
                info!(order_id = %notification.order_id, "Duplicate Midtrans notification");
                return Ok(WebhookAck::ok("Already processed"));
            }
        };

        match self.apply(&code, outcome, &notification, now).await {
            Ok(message) => Ok(WebhookAck::ok(message)),
            Err(e) => {
                error!(code = %code, "Failed to process Midtrans notification: {}", e);
                if let Some(key) = claim_key {
                    self.release(&key).await;
                }
                Err(ApiError::internal("Failed to process notification"))
            }
        }
    }

    async fn apply(
        &self,
        code: &str,
        outcome: PaymentOutcome,
        n: &MidtransNotification,
        now: DateTime<Utc>,
    ) -> ApiResult<&'static str> {
        match outcome {
            PaymentOutcome::Success => {
                let method = n.payment_type.as_deref().unwrap_or("midtrans");
                let settled = self
                    .subscriptions
                    .confirm_payment(code, method, n.transaction_id.as_deref(), now)
                    .await?;
                if matches!(settled.status, SubscriptionStatus::Active | SubscriptionStatus::Completed) {
                    Ok("Payment confirmed")
                } else {
                    Ok("Payment recorded for review")
                }
            }
            PaymentOutcome::Failed => {
                self.subscriptions
                    .mark_failed(code, &n.transaction_status, now)
                    .await?;
                Ok("Payment failed")
            }
            PaymentOutcome::Challenge => {
                warn!(code = %code, "Payment flagged for fraud review");
                Ok("Payment under review")
            }
            PaymentOutcome::Pending => Ok("Payment pending"),
        }
    }

    /// Claims `midtrans:{order_id}:{status}`. Without Redis, or when Redis is
    /// unreachable, every notification is processed; settlement itself is
    /// idempotent.
    async fn claim(&self, n: &MidtransNotification) -> Claim {
        let Some(client) = &self.redis else {
            return Claim::Acquired(None);
        };
        let key = format!("midtrans:{}:{}", n.order_id, n.transaction_status);

        let result = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("SET")
                .arg(&key)
                .arg("1")
                .arg("NX")
                .arg("EX")
                .arg(CLAIM_TTL_SECS)
                .query_async::<Option<String>>(&mut conn)
                .await
        }
        .await;

        match result {
            Ok(Some(_)) => Claim::Acquired(Some(key)),
            Ok(None) => Claim::Duplicate,
            Err(e) => {
                warn!(key = %key, "Redis claim failed, processing anyway: {}", e);
                Claim::Acquired(None)
            }
        }
    }

    async fn release(&self, key: &str) {
        let Some(client) = &self.redis else {
            return;
        };
        let result = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("DEL").arg(key).query_async::<i64>(&mut conn).await
        }
        .await;
        if let Err(e) = result {
            warn!(key = %key, "Failed to release webhook claim: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::services::testing;
    use kasir_core::Role;
    use kasir_db::repository::subscription::PAYMENT_NEEDS_REVIEW;
    use serde_json::json;

    const KEY: &str = "SB-Mid-server-test";

    fn notification(order_id: &str, status: &str) -> MidtransNotification {
        let mut n = MidtransNotification {
            order_id: order_id.to_string(),
            status_code: "200".to_string(),
            gross_amount: "99000.00".to_string(),
            signature_key: String::new(),
            transaction_status: status.to_string(),
            fraud_status: None,
            payment_type: Some("qris".to_string()),
            transaction_id: Some("trx-9".to_string()),
        };
        n.signature_key = expected_signature(&n, KEY);
        n
    }

    fn body(n: &MidtransNotification) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "order_id": n.order_id,
            "status_code": n.status_code,
            "gross_amount": n.gross_amount,
            "signature_key": n.signature_key,
            "transaction_status": n.transaction_status,
            "payment_type": n.payment_type,
            "transaction_id": n.transaction_id,
        }))
        .unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("capture", Some("accept")), Some(PaymentOutcome::Success));
        assert_eq!(map_status("capture", Some("challenge")), Some(PaymentOutcome::Challenge));
        assert_eq!(map_status("settlement", None), Some(PaymentOutcome::Success));
        assert_eq!(map_status("expire", None), Some(PaymentOutcome::Failed));
        assert_eq!(map_status("deny", None), Some(PaymentOutcome::Failed));
        assert_eq!(map_status("pending", None), Some(PaymentOutcome::Pending));
        assert_eq!(map_status("refund", None), None);
    }

    #[test]
    fn test_signature() {
        let mut n = notification("SUB-AB12CD34EF-1718000000", "settlement");
        assert!(signature_valid(&n, KEY));
        assert!(!signature_valid(&n, "other-key"));

        n.gross_amount = "1.00".to_string();
        assert!(!signature_valid(&n, KEY));
    }

    #[tokio::test]
    async fn test_settlement_activates_subscription() {
        let db = testing::db().await;
        let user = testing::user(&db, Role::Owner, true).await;
        let (plan, price) = testing::plan(&db, "basic", 1, [1, 100, 5], 99_000).await;
        let now = Utc::now();
        let pending = SubscriptionService::new(db.clone())
            .subscribe(&user, &plan.id, &price.id, now)
            .await
            .unwrap();

        let service = WebhookService::new(db.clone(), Some(KEY.to_string()), None);
        let n = notification(&format!("{}-1718000000", pending.subscription_code), "settlement");
        let ack = service.handle(&body(&n), now).await.unwrap();
        assert!(ack.success);

        let stored = db.subscriptions().get_by_id(&pending.id).await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);

        // Redelivery is harmless
        assert!(service.handle(&body(&n), now).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_settlement_after_cancel_is_recorded_for_review() {
        let db = testing::db().await;
        let user = testing::user(&db, Role::Owner, true).await;
        let (plan, price) = testing::plan(&db, "basic", 1, [1, 100, 5], 99_000).await;
        let now = Utc::now();
        let subscriptions = SubscriptionService::new(db.clone());
        let pending = subscriptions.subscribe(&user, &plan.id, &price.id, now).await.unwrap();
        subscriptions.cancel(&user, None, now).await.unwrap();

        let service = WebhookService::new(db.clone(), Some(KEY.to_string()), None);
        let n = notification(&format!("{}-1718000000", pending.subscription_code), "settlement");
        let ack = service.handle(&body(&n), now).await.unwrap();
        assert!(ack.success);
        assert_eq!(ack.message, "Payment recorded for review");

        // The gateway retries until it sees a 2xx; the second delivery adds nothing.
        service.handle(&body(&n), now).await.unwrap();

        let stored = db.subscriptions().get_by_id(&pending.id).await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
        let payments = db.subscriptions().payments_for(&pending.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PAYMENT_NEEDS_REVIEW);
        assert_eq!(payments[0].gateway_payment_id.as_deref(), Some("trx-9"));
    }

    #[tokio::test]
    async fn test_rejects_bad_signature_and_ignores_unknown() {
        let db = testing::db().await;
        let service = WebhookService::new(db, Some(KEY.to_string()), None);
        let now = Utc::now();

        let mut forged = notification("SUB-AB12CD34EF-1718000000", "settlement");
        forged.signature_key = "00".repeat(64);
        let err = service.handle(&body(&forged), now).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);

        let unknown = notification("SUB-AB12CD34EF-1718000000", "settlement");
        let ack = service.handle(&body(&unknown), now).await.unwrap();
        assert!(!ack.success);

        let ack = service.handle(b"not json", now).await.unwrap();
        assert!(!ack.success);
    }
}
