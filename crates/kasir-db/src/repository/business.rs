//! # Business Repository
//!
//! Tenant businesses. Each business points at the subscription currently
//! powering it; the pointer is moved inside the activation transaction.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasir_core::Business;

const SELECT_BUSINESS: &str = r#"
    SELECT id, owner_id, name, phone, address, current_subscription_id,
           subscription_expires_at, is_active, created_at, updated_at
    FROM businesses
"#;

#[derive(Debug, Clone)]
pub struct BusinessRepository {
    pool: SqlitePool,
}

impl BusinessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BusinessRepository { pool }
    }

    pub async fn insert(&self, business: &Business) -> DbResult<()> {
        debug!(owner_id = %business.owner_id, name = %business.name, "Inserting business");

        sqlx::query(
            r#"
            INSERT INTO businesses (
                id, owner_id, name, phone, address, current_subscription_id,
                subscription_expires_at, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&business.id)
        .bind(&business.owner_id)
        .bind(&business.name)
        .bind(&business.phone)
        .bind(&business.address)
        .bind(&business.current_subscription_id)
        .bind(business.subscription_expires_at)
        .bind(business.is_active)
        .bind(business.created_at)
        .bind(business.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Business>> {
        let business = sqlx::query_as::<_, Business>(&format!("{SELECT_BUSINESS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(business)
    }

    pub async fn require(&self, id: &str) -> DbResult<Business> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Business", id))
    }

    /// Oldest first, so the first entry is the owner's default business.
    pub async fn list_by_owner(&self, owner_id: &str) -> DbResult<Vec<Business>> {
        let businesses = sqlx::query_as::<_, Business>(&format!(
            "{SELECT_BUSINESS} WHERE owner_id = ?1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(businesses)
    }

    pub async fn count_by_owner(&self, owner_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM businesses WHERE owner_id = ?1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Moves every business of `owner_id` onto the given subscription.
    pub async fn repoint_subscription(
        &self,
        owner_id: &str,
        subscription_id: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        repoint_owner_businesses(&mut conn, owner_id, subscription_id, expires_at).await
    }
}

/// Shared with the subscription activation transaction.
pub(crate) async fn repoint_owner_businesses(
    conn: &mut SqliteConnection,
    owner_id: &str,
    subscription_id: &str,
    expires_at: DateTime<Utc>,
) -> DbResult<u64> {
    debug!(owner_id = %owner_id, subscription_id = %subscription_id, "Repointing businesses");

    let result = sqlx::query(
        r#"
        UPDATE businesses SET
            current_subscription_id = ?2,
            subscription_expires_at = ?3,
            updated_at = ?4
        WHERE owner_id = ?1
        "#,
    )
    .bind(owner_id)
    .bind(subscription_id)
    .bind(expires_at)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
