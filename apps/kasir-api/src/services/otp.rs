//! WhatsApp number verification.
//!
//! Codes are queued in the WhatsApp outbox rather than sent inline; the
//! sweep task delivers them.

use chrono::{DateTime, Utc};
use kasir_core::messages::otp_message;
use kasir_core::otp::{normalize_phone, OtpOutcome};
use kasir_core::validation::{validate_otp_code, validate_phone};
use kasir_core::{CoreError, MessageKind, User};
use kasir_db::Database;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize)]
pub struct OtpSent {
    pub phone: String,
    /// `None` when no code was issued.
    pub expires_at: Option<DateTime<Utc>>,
    /// The caller already verified this number within the last 24 hours.
    pub already_verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpVerified {
    pub phone: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OtpService {
    db: Database,
}

impl OtpService {
    pub fn new(db: Database) -> Self {
        OtpService { db }
    }

    /// Issues a fresh code for `raw_phone`, replacing unverified ones.
    ///
    /// A caller whose own number was verified within the last 24 hours gets
    /// `already_verified` back and no new message is queued.
    pub async fn send(&self, user: &User, raw_phone: &str, now: DateTime<Utc>) -> ApiResult<OtpSent> {
        validate_phone(raw_phone)?;
        let phone = normalize_phone(raw_phone);

        if self.db.users().phone_taken_by_other(&phone, &user.id).await? {
            return Err(
                ApiError::validation("Nomor WhatsApp ini sudah terdaftar oleh user lain.")
                    .with_details(json!({ "field": "phone" })),
            );
        }

        if user.phone.as_deref() == Some(phone.as_str()) && user.whatsapp_verified_at.is_some() {
            let latest = self.db.otp().latest_for_phone(&phone).await?;
            if latest.is_some_and(|v| v.is_recently_verified(now)) {
                info!(user_id = %user.id, phone = %phone, "Number verified recently, OTP not resent");
                return Ok(OtpSent {
                    phone,
                    expires_at: None,
                    already_verified: true,
                });
            }
        }

        let verification = self.db.otp().issue(&phone, now).await?;
        self.db
            .outbox()
            .enqueue(&phone, &otp_message(&verification.code), MessageKind::Otp, Some(&verification.id))
            .await?;

        info!(user_id = %user.id, phone = %phone, "OTP issued");
        Ok(OtpSent {
            phone,
            expires_at: Some(verification.expires_at),
            already_verified: false,
        })
    }

    /// Checks a code and marks the user's number verified on success.
    pub async fn verify(
        &self,
        user: &User,
        raw_phone: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<OtpVerified> {
        validate_otp_code(code)?;
        let phone = normalize_phone(raw_phone);

        let mut verification = self
            .db
            .otp()
            .latest_for_phone(&phone)
            .await?
            .ok_or_else(|| CoreError::OtpRejected {
                reason: "no code requested for this number".to_string(),
            })?;

        let outcome = verification.check(code, now);
        if outcome == OtpOutcome::TooManyAttempts {
            warn!(phone = %phone, "OTP attempts exhausted, code burned");
            self.db.otp().delete(&verification.id).await?;
        } else {
            self.db.otp().save_check(&verification).await?;
        }
        outcome.into_result()?;

        self.db.users().mark_whatsapp_verified(&user.id, &phone, now).await?;
        info!(user_id = %user.id, phone = %phone, "WhatsApp number verified");
        Ok(OtpVerified {
            phone,
            verified_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::services::testing;
    use kasir_core::Role;

    #[tokio::test]
    async fn test_send_queues_message_and_verify_marks_user() {
        let db = testing::db().await;
        let user = testing::user(&db, Role::Owner, false).await;
        let service = OtpService::new(db.clone());
        let now = Utc::now();

        let sent = service.send(&user, "0812-9999-0001", now).await.unwrap();
        assert_eq!(sent.phone, "6281299990001");
        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);

        let stored = db.otp().latest_for_phone(&sent.phone).await.unwrap().unwrap();
        service.verify(&user, "081299990001", &stored.code, now).await.unwrap();

        let user = db.users().require(&user.id).await.unwrap();
        assert!(user.whatsapp_verified_at.is_some());
        assert_eq!(user.phone.as_deref(), Some("6281299990001"));
    }

    #[tokio::test]
    async fn test_resend_skipped_within_verified_window() {
        let db = testing::db().await;
        let user = testing::user(&db, Role::Owner, false).await;
        let service = OtpService::new(db.clone());
        let now = Utc::now();

        let sent = service.send(&user, "081299990003", now).await.unwrap();
        let stored = db.otp().latest_for_phone(&sent.phone).await.unwrap().unwrap();
        service.verify(&user, &sent.phone, &stored.code, now).await.unwrap();
        let user = db.users().require(&user.id).await.unwrap();

        let again = service.send(&user, "081299990003", now + chrono::Duration::hours(1)).await.unwrap();
        assert!(again.already_verified);
        assert!(again.expires_at.is_none());
        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);

        // A different number, or the same one after the window, gets a code.
        let other = service.send(&user, "081299990004", now).await.unwrap();
        assert!(!other.already_verified);
        let later = service.send(&user, "081299990003", now + chrono::Duration::hours(25)).await.unwrap();
        assert!(!later.already_verified);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_wrong_code_rejected() {
        let db = testing::db().await;
        let user = testing::user(&db, Role::Owner, false).await;
        let service = OtpService::new(db.clone());
        let now = Utc::now();

        let sent = service.send(&user, "081299990002", now).await.unwrap();
        let stored = db.otp().latest_for_phone(&sent.phone).await.unwrap().unwrap();
        let wrong = if stored.code == "000000" { "111111" } else { "000000" };

        let err = service.verify(&user, &sent.phone, wrong, now).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::OtpRejected);

        let after = db.otp().latest_for_phone(&sent.phone).await.unwrap().unwrap();
        assert_eq!(after.attempts, 1);
    }

    #[tokio::test]
    async fn test_phone_of_other_user_rejected() {
        let db = testing::db().await;
        let holder = testing::user(&db, Role::Owner, true).await;
        let other = testing::user(&db, Role::Owner, false).await;

        let err = OtpService::new(db)
            .send(&other, holder.phone.as_deref().unwrap(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
