//! # Database Migrations
//!
//! Embedded SQL migrations for Kasir.
//!
//! ## Schema Files
//! ```text
//! migrations/sqlite/
//! ├── 001_tenants.sql        users, businesses, outlets, products,
//! │                          employees, employee_shifts, audit_logs
//! ├── 002_orders.sql         cashier_shifts, orders, order_items, order_payments
//! ├── 003_subscriptions.sql  plans, plan prices, user subscriptions, payments
//! ├── 004_payroll.sql        payrolls, payroll_items
//! └── 005_whatsapp.sql       OTP codes, WhatsApp outbox
//! ```
//!
//! ## Adding New Migrations
//! Add `NNN_description.sql` with the next number. Never edit an applied
//! migration: sqlx stores a checksum per file.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded at compile time from `migrations/sqlite`.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending migrations in filename order, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(
        available = MIGRATOR.migrations.len(),
        "Checking for pending migrations"
    );

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for health reporting.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    Ok((total, applied as usize))
}
