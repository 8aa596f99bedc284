//! Cashier shifts and drawer reconciliation.

use chrono::{DateTime, Utc};
use kasir_core::shift::{reconcile, CashierShift, ShiftExpectation, ShiftStatus};
use kasir_core::validation::validate_price;
use kasir_core::{Business, CoreError, Money, User};
use kasir_db::{generate_id, Database};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiResult;

#[derive(Debug, Clone, Deserialize)]
pub struct OpenShiftRequest {
    pub outlet_id: String,
    #[serde(default)]
    pub opening_balance: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloseShiftRequest {
    pub actual_cash: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShiftSummary {
    pub shift: CashierShift,
    pub expectation: ShiftExpectation,
    pub has_mismatch: bool,
}

#[derive(Clone)]
pub struct ShiftService {
    db: Database,
}

impl ShiftService {
    pub fn new(db: Database) -> Self {
        ShiftService { db }
    }

    /// Opens a shift for the cashier at an outlet. One open shift per
    /// cashier and outlet.
    pub async fn open(
        &self,
        business: &Business,
        user: &User,
        req: &OpenShiftRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<CashierShift> {
        validate_price("opening_balance", req.opening_balance)?;
        let outlet = self.db.outlets().get_for_business(&business.id, &req.outlet_id).await?;

        if let Some(open) = self.db.cashier_shifts().find_open(&user.id, &outlet.id).await? {
            return Err(CoreError::ShiftAlreadyOpen(open.id).into());
        }

        let shift = CashierShift {
            id: generate_id(),
            business_id: business.id.clone(),
            outlet_id: outlet.id,
            user_id: user.id.clone(),
            status: ShiftStatus::Open,
            opened_at: now,
            closed_at: None,
            opening_balance: req.opening_balance,
            expected_cash: req.opening_balance,
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
            opening_notes: req.notes.clone(),
            closing_notes: None,
            closed_by_user_id: None,
        };
        self.db.cashier_shifts().open(&shift).await?;
        Ok(shift)
    }

    async fn expectation(&self, shift: &CashierShift) -> ApiResult<ShiftExpectation> {
        let orders = self.db.orders().paid_orders_for_shift(&shift.id).await?;
        Ok(reconcile(shift.opening_balance(), &orders))
    }

    /// Live view of an open or closed shift.
    pub async fn summary(&self, business: &Business, id: &str) -> ApiResult<ShiftSummary> {
        let mut shift = self.db.cashier_shifts().get_for_business(&business.id, id).await?;
        let expectation = self.expectation(&shift).await?;
        if shift.is_open() {
            shift.apply_expectation(&expectation);
        }
        Ok(ShiftSummary {
            has_mismatch: expectation.has_mismatch(),
            shift,
            expectation,
        })
    }

    /// Closes the shift against the counted cash.
    pub async fn close(
        &self,
        business: &Business,
        user: &User,
        id: &str,
        req: &CloseShiftRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<ShiftSummary> {
        let mut shift = self.db.cashier_shifts().get_for_business(&business.id, id).await?;
        let expectation = self.expectation(&shift).await?;

        shift.close(
            &expectation,
            Money::from_rupiah(req.actual_cash),
            req.notes.clone(),
            &user.id,
            now,
        )?;
        self.db.cashier_shifts().close(&shift).await?;

        info!(
            shift_id = %shift.id,
            expected_cash = shift.expected_cash,
            cash_difference = ?shift.cash_difference,
            "Cashier shift closed"
        );
        Ok(ShiftSummary {
            has_mismatch: expectation.has_mismatch(),
            shift,
            expectation,
        })
    }

    pub async fn list(&self, business: &Business, outlet_id: &str, limit: u32) -> ApiResult<Vec<CashierShift>> {
        Ok(self
            .db
            .cashier_shifts()
            .list_by_outlet(&business.id, outlet_id, limit)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::services::order::tests::{order_request, outlet, product};
    use crate::services::order::PaymentRequest;
    use crate::services::{testing, OrderService};
    use kasir_core::order::PaymentMethod;
    use kasir_core::Role;

    #[tokio::test]
    async fn test_close_reconciles_cash_and_change() {
        let db = testing::db().await;
        let owner = testing::user(&db, Role::Owner, true).await;
        let business = testing::business(&db, &owner).await;
        let outlet = outlet(&db, &business).await;
        let kopi = product(&db, &business, "KOPI", 18_000, 20).await;
        let shifts = ShiftService::new(db.clone());
        let orders = OrderService::new(db.clone(), "http://localhost");
        let now = Utc::now();

        let open = OpenShiftRequest {
            outlet_id: outlet.id.clone(),
            opening_balance: 100_000,
            notes: None,
        };
        let shift = shifts.open(&business, &owner, &open, now).await.unwrap();

        let err = shifts.open(&business, &owner, &open, now).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);

        let order = orders
            .create(&business, &owner, &order_request(&outlet, &kopi, 1), now)
            .await
            .unwrap();
        assert_eq!(order.order.shift_id.as_deref(), Some(shift.id.as_str()));
        let cash = PaymentRequest {
            method: PaymentMethod::Cash,
            amount: 20_000,
            reference: None,
            customer_phone: None,
        };
        orders.pay(&business, &order.order.id, &cash, now).await.unwrap();

        let close = CloseShiftRequest {
            actual_cash: 117_000,
            notes: Some("kurang seribu".to_string()),
        };
        let summary = shifts.close(&business, &owner, &shift.id, &close, now).await.unwrap();
        assert_eq!(summary.shift.expected_cash, 118_000);
        assert_eq!(summary.shift.cash_difference, Some(-1_000));
        assert_eq!(summary.shift.status, ShiftStatus::Closed);

        let err = shifts.close(&business, &owner, &shift.id, &close, now).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
    }
}
