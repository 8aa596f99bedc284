//! # Cashier Shift Repository
//!
//! Cash drawer sessions. The partial unique index
//! `idx_cashier_shifts_one_open` keeps at most one open shift per cashier
//! and outlet; a second `open()` surfaces as `UniqueViolation`.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use kasir_core::shift::CashierShift;

const SELECT_SHIFT: &str = r#"
    SELECT id, business_id, outlet_id, user_id, status, opened_at, closed_at,
           opening_balance, expected_cash, expected_card, expected_transfer,
           expected_qris, expected_total, actual_cash, actual_card,
           actual_transfer, actual_qris, actual_total, cash_difference,
           total_difference, total_transactions, cash_transactions,
           card_transactions, transfer_transactions, qris_transactions,
           opening_notes, closing_notes, closed_by_user_id
    FROM cashier_shifts
"#;

#[derive(Debug, Clone)]
pub struct CashierShiftRepository {
    pool: SqlitePool,
}

impl CashierShiftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashierShiftRepository { pool }
    }

    /// Opens a shift.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - cashier already has an open shift here
    pub async fn open(&self, shift: &CashierShift) -> DbResult<()> {
        debug!(user_id = %shift.user_id, outlet_id = %shift.outlet_id, "Opening cashier shift");

        sqlx::query(
            r#"
            INSERT INTO cashier_shifts (
                id, business_id, outlet_id, user_id, status, opened_at,
                opening_balance, opening_notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&shift.id)
        .bind(&shift.business_id)
        .bind(&shift.outlet_id)
        .bind(&shift.user_id)
        .bind(shift.status)
        .bind(shift.opened_at)
        .bind(shift.opening_balance)
        .bind(&shift.opening_notes)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("open_shift", &shift.outlet_id),
            other => other,
        })?;

        info!(shift_id = %shift.id, opening_balance = shift.opening_balance, "Cashier shift opened");
        Ok(())
    }

    pub async fn get_for_business(&self, business_id: &str, id: &str) -> DbResult<CashierShift> {
        sqlx::query_as::<_, CashierShift>(&format!(
            "{SELECT_SHIFT} WHERE id = ?1 AND business_id = ?2"
        ))
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("CashierShift", id))
    }

    pub async fn find_open(&self, user_id: &str, outlet_id: &str) -> DbResult<Option<CashierShift>> {
        let shift = sqlx::query_as::<_, CashierShift>(&format!(
            "{SELECT_SHIFT} WHERE user_id = ?1 AND outlet_id = ?2 AND status = 'open'"
        ))
        .bind(user_id)
        .bind(outlet_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(shift)
    }

    /// Most recent first.
    pub async fn list_by_outlet(&self, business_id: &str, outlet_id: &str, limit: u32) -> DbResult<Vec<CashierShift>> {
        let shifts = sqlx::query_as::<_, CashierShift>(&format!(
            "{SELECT_SHIFT} WHERE business_id = ?1 AND outlet_id = ?2 ORDER BY opened_at DESC LIMIT ?3"
        ))
        .bind(business_id)
        .bind(outlet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(shifts)
    }

    /// Writes the closing figures. Only an open shift can be closed, so a
    /// double close returns `Conflict`.
    pub async fn close(&self, shift: &CashierShift) -> DbResult<()> {
        debug!(shift_id = %shift.id, "Closing cashier shift");

        let result = sqlx::query(
            r#"
            UPDATE cashier_shifts SET
                status = ?2, closed_at = ?3,
                expected_cash = ?4, expected_card = ?5, expected_transfer = ?6,
                expected_qris = ?7, expected_total = ?8,
                actual_cash = ?9, actual_card = ?10, actual_transfer = ?11,
                actual_qris = ?12, actual_total = ?13,
                cash_difference = ?14, total_difference = ?15,
                total_transactions = ?16, cash_transactions = ?17,
                card_transactions = ?18, transfer_transactions = ?19,
                qris_transactions = ?20, closing_notes = ?21, closed_by_user_id = ?22
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(&shift.id)
        .bind(shift.status)
        .bind(shift.closed_at)
        .bind(shift.expected_cash)
        .bind(shift.expected_card)
        .bind(shift.expected_transfer)
        .bind(shift.expected_qris)
        .bind(shift.expected_total)
        .bind(shift.actual_cash)
        .bind(shift.actual_card)
        .bind(shift.actual_transfer)
        .bind(shift.actual_qris)
        .bind(shift.actual_total)
        .bind(shift.cash_difference)
        .bind(shift.total_difference)
        .bind(shift.total_transactions)
        .bind(shift.cash_transactions)
        .bind(shift.card_transactions)
        .bind(shift.transfer_transactions)
        .bind(shift.qris_transactions)
        .bind(&shift.closing_notes)
        .bind(&shift.closed_by_user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("CashierShift", &shift.id, "shift is not open"));
        }

        info!(
            shift_id = %shift.id,
            cash_difference = ?shift.cash_difference,
            "Cashier shift closed"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repository::test_support;
    use crate::{generate_id, Database};
    use chrono::Utc;
    use kasir_core::shift::ShiftStatus;
    use kasir_core::{Money, Outlet};

    pub(crate) async fn open(db: &Database, user_id: &str, outlet: &Outlet) -> CashierShift {
        let shift = CashierShift {
            id: generate_id(),
            business_id: outlet.business_id.clone(),
            outlet_id: outlet.id.clone(),
            user_id: user_id.to_string(),
            status: ShiftStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            opening_balance: 200_000,
            expected_cash: 0,
            expected_card: 0,
            expected_transfer: 0,
            expected_qris: 0,
            expected_total: 0,
            actual_cash: None,
            actual_card: None,
            actual_transfer: None,
            actual_qris: None,
            actual_total: None,
            cash_difference: None,
            total_difference: None,
            total_transactions: 0,
            cash_transactions: 0,
            card_transactions: 0,
            transfer_transactions: 0,
            qris_transactions: 0,
            opening_notes: None,
            closing_notes: None,
            closed_by_user_id: None,
        };
        db.cashier_shifts().open(&shift).await.unwrap();
        shift
    }

    #[tokio::test]
    async fn test_second_open_shift_rejected() {
        let db = test_support::db().await;
        let (owner, _, outlet) = test_support::tenant(&db).await;
        let first = open(&db, &owner.id, &outlet).await;

        let mut second = first.clone();
        second.id = generate_id();
        let err = db.cashier_shifts().open(&second).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "open_shift"));

        let found = db.cashier_shifts().find_open(&owner.id, &outlet.id).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_close_then_reopen() {
        let db = test_support::db().await;
        let (owner, business, outlet) = test_support::tenant(&db).await;
        let mut shift = open(&db, &owner.id, &outlet).await;

        let exp = kasir_core::shift::reconcile(shift.opening_balance(), &[]);
        shift
            .close(&exp, Money::from_rupiah(190_000), Some("kurang".into()), &owner.id, Utc::now())
            .unwrap();
        db.cashier_shifts().close(&shift).await.unwrap();

        let stored = db.cashier_shifts().get_for_business(&business.id, &shift.id).await.unwrap();
        assert_eq!(stored.status, ShiftStatus::Closed);
        assert_eq!(stored.cash_difference, Some(-10_000));
        assert!(db.cashier_shifts().close(&shift).await.is_err());

        // Closed shift frees the slot
        open(&db, &owner.id, &outlet).await;
        let history = db.cashier_shifts().list_by_outlet(&business.id, &outlet.id, 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
