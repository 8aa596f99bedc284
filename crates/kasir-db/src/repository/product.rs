//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Stock Updates
//! Stock is always changed by delta (`stock = stock + ?`), never by writing
//! an absolute value read earlier, so two cashiers selling the same item
//! cannot overwrite each other's decrement.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasir_core::Product;

const SELECT_PRODUCT: &str = r#"
    SELECT id, business_id, sku, name, description, price, stock, track_stock,
           is_active, created_at, updated_at
    FROM products
"#;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists in this business
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, business_id = %product.business_id, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, business_id, sku, name, description, price, stock,
                track_stock, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.business_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.track_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("sku", &product.sku),
            other => other,
        })?;

        Ok(())
    }

    /// Product scoped to a business.
    pub async fn get_for_business(&self, business_id: &str, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "{SELECT_PRODUCT} WHERE id = ?1 AND business_id = ?2"
        ))
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    /// Active products, optionally filtered by a name/SKU substring.
    pub async fn list_by_business(
        &self,
        business_id: &str,
        query: Option<&str>,
        limit: u32,
    ) -> DbResult<Vec<Product>> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.replace('%', "").replace('_', "")));

        debug!(business_id = %business_id, query = ?pattern, limit, "Listing products");

        let products = sqlx::query_as::<_, Product>(&format!(
            r#"{SELECT_PRODUCT}
            WHERE business_id = ?1 AND is_active = 1
              AND (?2 IS NULL OR name LIKE ?2 OR sku LIKE ?2)
            ORDER BY name
            LIMIT ?3"#
        ))
        .bind(business_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    /// Active products of a business; the plan's product limit counts these.
    pub async fn count_by_business(&self, business_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE business_id = ?1 AND is_active = 1",
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Changes stock by `delta` (negative for sales, positive for restocking).
    pub async fn update_stock(&self, id: &str, delta: i64) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        adjust_stock(&mut conn, id, delta).await
    }

    /// Soft-deletes a product; historical order items still reference it.
    pub async fn soft_delete(&self, business_id: &str, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?3 WHERE id = ?1 AND business_id = ?2",
        )
        .bind(id)
        .bind(business_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}

/// Delta stock update usable inside an order transaction. Products that do
/// not track stock are left alone.
pub(crate) async fn adjust_stock(conn: &mut SqliteConnection, id: &str, delta: i64) -> DbResult<()> {
    debug!(id = %id, delta, "Updating stock");

    let result = sqlx::query(
        r#"
        UPDATE products SET
            stock = CASE WHEN track_stock = 1 THEN stock + ?2 ELSE stock END,
            updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(delta)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repository::test_support;
    use crate::{generate_id, Database};

    pub(crate) async fn product(db: &Database, business_id: &str, sku: &str, price: i64, stock: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: generate_id(),
            business_id: business_id.to_string(),
            sku: sku.to_string(),
            name: format!("Produk {}", sku),
            description: None,
            price,
            stock,
            track_stock: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_duplicate_sku_per_business() {
        let db = test_support::db().await;
        let (owner, business, _) = test_support::tenant(&db).await;
        let p = product(&db, &business.id, "KOPI-1", 18_000, 10).await;

        let mut dup = p.clone();
        dup.id = generate_id();
        let err = db.products().insert(&dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "sku"));

        // Same SKU in another business is fine
        let other = test_support::business(&db, &owner.id).await;
        product(&db, &other.id, "KOPI-1", 18_000, 10).await;
    }

    #[tokio::test]
    async fn test_search_and_count() {
        let db = test_support::db().await;
        let (_, business, _) = test_support::tenant(&db).await;
        product(&db, &business.id, "KOPI-1", 18_000, 10).await;
        product(&db, &business.id, "TEH-1", 8_000, 10).await;

        let all = db.products().list_by_business(&business.id, None, 50).await.unwrap();
        assert_eq!(all.len(), 2);
        let kopi = db
            .products()
            .list_by_business(&business.id, Some("kopi"), 50)
            .await
            .unwrap();
        assert_eq!(kopi.len(), 1);
        assert_eq!(db.products().count_by_business(&business.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_stock_and_soft_delete() {
        let db = test_support::db().await;
        let (_, business, _) = test_support::tenant(&db).await;
        let p = product(&db, &business.id, "KOPI-1", 18_000, 10).await;

        db.products().update_stock(&p.id, -3).await.unwrap();
        let reloaded = db
            .products()
            .get_for_business(&business.id, &p.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.stock, 7);

        db.products().soft_delete(&business.id, &p.id).await.unwrap();
        assert_eq!(db.products().count_by_business(&business.id).await.unwrap(), 0);
        assert!(db.products().update_stock("missing", 1).await.unwrap_err().is_not_found());
    }
}
