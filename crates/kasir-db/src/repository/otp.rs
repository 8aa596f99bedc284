//! # OTP Repository
//!
//! WhatsApp verification codes. Only the newest unverified code per phone
//! is kept: issuing a code deletes the older ones in the same transaction.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::{generate_id, random_otp_draw};
use crate::error::{DbError, DbResult};
use kasir_core::otp::{format_code, otp_expires_at, WhatsappVerification};

const SELECT_VERIFICATION: &str = r#"
    SELECT id, phone, code, expires_at, verified_at, attempts, created_at
    FROM whatsapp_verifications
"#;

#[derive(Debug, Clone)]
pub struct OtpRepository {
    pool: SqlitePool,
}

impl OtpRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OtpRepository { pool }
    }

    /// Issues a fresh code for a normalized phone number.
    pub async fn issue(&self, phone: &str, now: DateTime<Utc>) -> DbResult<WhatsappVerification> {
        let verification = WhatsappVerification {
            id: generate_id(),
            phone: phone.to_string(),
            code: format_code(random_otp_draw()),
            expires_at: otp_expires_at(now),
            verified_at: None,
            attempts: 0,
            created_at: now,
        };

        let mut tx = self.pool.begin().await?;

        let replaced = sqlx::query(
            "DELETE FROM whatsapp_verifications WHERE phone = ?1 AND verified_at IS NULL",
        )
        .bind(phone)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO whatsapp_verifications (id, phone, code, expires_at, verified_at, attempts, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&verification.id)
        .bind(&verification.phone)
        .bind(&verification.code)
        .bind(verification.expires_at)
        .bind(verification.verified_at)
        .bind(verification.attempts)
        .bind(verification.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(phone = %phone, replaced, "OTP issued");
        Ok(verification)
    }

    /// Newest code for the phone, verified or not.
    pub async fn latest_for_phone(&self, phone: &str) -> DbResult<Option<WhatsappVerification>> {
        let verification = sqlx::query_as::<_, WhatsappVerification>(&format!(
            "{SELECT_VERIFICATION} WHERE phone = ?1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(verification)
    }

    /// Stores the attempt counter and verification time after a check.
    pub async fn save_check(&self, verification: &WhatsappVerification) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE whatsapp_verifications SET attempts = ?2, verified_at = ?3 WHERE id = ?1",
        )
        .bind(&verification.id)
        .bind(verification.attempts)
        .bind(verification.verified_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("WhatsappVerification", &verification.id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM whatsapp_verifications WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes expired codes that were never verified.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM whatsapp_verifications WHERE verified_at IS NULL AND expires_at < ?1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed, "Removed expired OTP codes");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support;
    use chrono::{Duration, Utc};
    use kasir_core::otp::OtpOutcome;

    const PHONE: &str = "6281234567890";

    #[tokio::test]
    async fn test_issue_replaces_older_codes() {
        let db = test_support::db().await;
        let now = Utc::now();

        let first = db.otp().issue(PHONE, now).await.unwrap();
        let second = db.otp().issue(PHONE, now + Duration::seconds(30)).await.unwrap();
        assert_eq!(second.code.len(), 6);

        let latest = db.otp().latest_for_phone(PHONE).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_ne!(latest.id, first.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM whatsapp_verifications")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_check_persists_attempts() {
        let db = test_support::db().await;
        let now = Utc::now();
        let mut issued = db.otp().issue(PHONE, now).await.unwrap();

        assert_eq!(issued.check("000000x", now), OtpOutcome::Mismatch);
        db.otp().save_check(&issued).await.unwrap();

        let code = issued.code.clone();
        assert_eq!(issued.check(&code, now), OtpOutcome::Verified);
        db.otp().save_check(&issued).await.unwrap();

        let stored = db.otp().latest_for_phone(PHONE).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
        assert!(stored.is_recently_verified(now));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_verified_codes() {
        let db = test_support::db().await;
        let now = Utc::now();
        let mut verified = db.otp().issue(PHONE, now).await.unwrap();
        let code = verified.code.clone();
        verified.check(&code, now);
        db.otp().save_check(&verified).await.unwrap();
        db.otp().issue("6289999999999", now).await.unwrap();

        let removed = db.otp().cleanup_expired(now + Duration::minutes(11)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(db.otp().latest_for_phone(PHONE).await.unwrap().is_some());
    }
}
