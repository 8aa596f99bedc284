//! # Outlet Repository

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasir_core::Outlet;

const SELECT_OUTLET: &str = r#"
    SELECT id, business_id, name, address, phone, working_days, is_active,
           created_at, updated_at
    FROM outlets
"#;

#[derive(Debug, Clone)]
pub struct OutletRepository {
    pool: SqlitePool,
}

impl OutletRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutletRepository { pool }
    }

    pub async fn insert(&self, outlet: &Outlet) -> DbResult<()> {
        debug!(business_id = %outlet.business_id, name = %outlet.name, "Inserting outlet");

        sqlx::query(
            r#"
            INSERT INTO outlets (
                id, business_id, name, address, phone, working_days, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&outlet.id)
        .bind(&outlet.business_id)
        .bind(&outlet.name)
        .bind(&outlet.address)
        .bind(&outlet.phone)
        .bind(&outlet.working_days)
        .bind(outlet.is_active)
        .bind(outlet.created_at)
        .bind(outlet.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Outlet scoped to a business; other tenants' outlets are "not found".
    pub async fn get_for_business(&self, business_id: &str, id: &str) -> DbResult<Outlet> {
        sqlx::query_as::<_, Outlet>(&format!(
            "{SELECT_OUTLET} WHERE id = ?1 AND business_id = ?2"
        ))
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Outlet", id))
    }

    pub async fn list_by_business(&self, business_id: &str) -> DbResult<Vec<Outlet>> {
        let outlets = sqlx::query_as::<_, Outlet>(&format!(
            "{SELECT_OUTLET} WHERE business_id = ?1 ORDER BY created_at ASC"
        ))
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(outlets)
    }

    /// Outlets across every business of the owner; plan limits count these.
    pub async fn count_for_owner(&self, owner_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM outlets o
            INNER JOIN businesses b ON b.id = o.business_id
            WHERE b.owner_id = ?1
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support;

    #[tokio::test]
    async fn test_count_spans_all_businesses() {
        let db = test_support::db().await;
        let (owner, business, _) = test_support::tenant(&db).await;
        let second = test_support::business(&db, &owner.id).await;
        test_support::outlet(&db, &second.id).await;

        assert_eq!(db.outlets().count_for_owner(&owner.id).await.unwrap(), 2);
        assert_eq!(db.outlets().list_by_business(&business.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_for_business_is_scoped() {
        let db = test_support::db().await;
        let (owner, business, outlet) = test_support::tenant(&db).await;
        let other = test_support::business(&db, &owner.id).await;

        assert!(db.outlets().get_for_business(&business.id, &outlet.id).await.is_ok());
        assert!(db
            .outlets()
            .get_for_business(&other.id, &outlet.id)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
