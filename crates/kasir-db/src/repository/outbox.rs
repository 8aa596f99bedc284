//! # WhatsApp Outbox Repository
//!
//! Outbound WhatsApp messages are written to `whatsapp_outbox` by the
//! request that produces them and delivered later by the background worker.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OTP send / reminder sweep / paid order                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue(phone, message, kind, reference)   sent_at = NULL             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DELIVERY WORKER                                                       │
//! │  1. get_pending(limit)         WHERE sent_at IS NULL                   │
//! │  2. hand to the sender                                                 │
//! │     ├── ok   → mark_sent(id)                                           │
//! │     └── err  → mark_failed(id, error)   attempts += 1                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `reference_id` doubles as a dedupe key: reminders use
//! `"{subscription_id}:{offset}"` and check [`OutboxRepository::exists`]
//! before enqueueing.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::generate_id;
use crate::error::DbResult;
use kasir_core::{MessageKind, OutboxMessage};

/// Messages that failed this many times are no longer retried.
pub const MAX_DELIVERY_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Queues a message for delivery.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let text = otp_message(&verification.code);
    /// db.outbox().enqueue(&phone, &text, MessageKind::Otp, Some(&verification.id)).await?;
    /// ```
    pub async fn enqueue(
        &self,
        phone: &str,
        message: &str,
        kind: MessageKind,
        reference_id: Option<&str>,
    ) -> DbResult<OutboxMessage> {
        debug!(phone = %phone, kind = ?kind, reference_id = ?reference_id, "Queuing WhatsApp message");

        let entry = OutboxMessage {
            id: generate_id(),
            phone: phone.to_string(),
            message: message.to_string(),
            kind,
            reference_id: reference_id.map(str::to_string),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            sent_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO whatsapp_outbox (
                id, phone, message, kind, reference_id, attempts, last_error, created_at, sent_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.phone)
        .bind(&entry.message)
        .bind(entry.kind)
        .bind(&entry.reference_id)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Whether a message of this kind was already queued for the reference.
    pub async fn exists(&self, kind: MessageKind, reference_id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM whatsapp_outbox WHERE kind = ?1 AND reference_id = ?2",
        )
        .bind(kind)
        .bind(reference_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Undelivered messages below the retry limit, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<OutboxMessage>> {
        let entries = sqlx::query_as::<_, OutboxMessage>(
            r#"
            SELECT id, phone, message, kind, reference_id, attempts, last_error, created_at, sent_at
            FROM whatsapp_outbox
            WHERE sent_at IS NULL AND attempts < ?1
            ORDER BY created_at ASC
            LIMIT ?2
            "#,
        )
        .bind(MAX_DELIVERY_ATTEMPTS)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn mark_sent(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE whatsapp_outbox SET sent_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE whatsapp_outbox SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM whatsapp_outbox WHERE sent_at IS NULL AND attempts < ?1",
        )
        .bind(MAX_DELIVERY_ATTEMPTS)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Deletes delivered messages sent before `before`.
    pub async fn cleanup_sent(&self, before: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM whatsapp_outbox WHERE sent_at IS NOT NULL AND sent_at < ?1",
        )
        .bind(before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
