//! # User Repository
//!
//! Login accounts. Phones are stored normalized (`62...`) once verified so
//! OTP lookups and reminders match on one format.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasir_core::User;

const SELECT_USER: &str = r#"
    SELECT id, name, email, phone, address, role, password_hash,
           whatsapp_verified_at, created_at, updated_at
    FROM users
"#;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Inserts a new account.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - email already registered
    pub async fn insert(&self, user: &User) -> DbResult<()> {
        debug!(email = %user.email, role = user.role.as_str(), "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (
                id, name, email, phone, address, role, password_hash,
                whatsapp_verified_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(user.whatsapp_verified_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("email", &user.email),
            other => other,
        })?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("{SELECT_USER} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Same as `get_by_id` but missing rows are an error.
    pub async fn require(&self, id: &str) -> DbResult<User> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    /// Case-insensitive email lookup for login.
    pub async fn get_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "{SELECT_USER} WHERE lower(email) = lower(?1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// True when another account already uses this normalized phone.
    pub async fn phone_taken_by_other(&self, phone: &str, user_id: &str) -> DbResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE phone = ?1 AND id != ?2")
                .bind(phone)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Updates the editable profile fields. Changing the phone clears the
    /// WhatsApp verification.
    pub async fn update_profile(
        &self,
        id: &str,
        name: &str,
        phone: Option<&str>,
        address: Option<&str>,
    ) -> DbResult<User> {
        debug!(id = %id, "Updating user profile");

        let result = sqlx::query(
            r#"
            UPDATE users SET
                name = ?2,
                whatsapp_verified_at = CASE
                    WHEN phone IS ?3 THEN whatsapp_verified_at
                    ELSE NULL
                END,
                phone = ?3,
                address = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(phone)
        .bind(address)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        self.require(id).await
    }

    /// Stores the verified phone and the verification time.
    pub async fn mark_whatsapp_verified(
        &self,
        id: &str,
        phone: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, "Marking WhatsApp verified");

        let result = sqlx::query(
            "UPDATE users SET phone = ?2, whatsapp_verified_at = ?3, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(phone)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support;
    use crate::DbError;
    use kasir_core::Role;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "Sari@Kopi.id", Role::Owner).await;

        let found = db.users().get_by_email("sari@kopi.id").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.role, Role::Owner);
        assert!(db.users().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "sari@kopi.id", Role::Owner).await;

        let mut again = user.clone();
        again.id = crate::generate_id();
        let err = db.users().insert(&again).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn test_phone_change_clears_verification() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "sari@kopi.id", Role::Owner).await;
        let repo = db.users();

        repo.mark_whatsapp_verified(&user.id, "6281234567890", chrono::Utc::now())
            .await
            .unwrap();

        // Same phone keeps the flag
        let same = repo
            .update_profile(&user.id, "Sari", Some("6281234567890"), Some("Jl. Merdeka"))
            .await
            .unwrap();
        assert!(same.whatsapp_verified_at.is_some());

        let changed = repo
            .update_profile(&user.id, "Sari", Some("6289999999999"), Some("Jl. Merdeka"))
            .await
            .unwrap();
        assert!(changed.whatsapp_verified_at.is_none());
    }

    #[tokio::test]
    async fn test_phone_taken_by_other() {
        let db = test_support::db().await;
        let a = test_support::user(&db, "a@kopi.id", Role::Owner).await;
        let b = test_support::user(&db, "b@kopi.id", Role::Owner).await;

        db.users()
            .mark_whatsapp_verified(&a.id, "6281234567890", chrono::Utc::now())
            .await
            .unwrap();

        assert!(db.users().phone_taken_by_other("6281234567890", &b.id).await.unwrap());
        assert!(!db.users().phone_taken_by_other("6281234567890", &a.id).await.unwrap());
    }
}
