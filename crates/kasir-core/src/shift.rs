//! # Cashier Shift Reconciliation
//!
//! Computes what the drawer should hold at the end of a shift and how far
//! the counted amounts are off.
//!
//! ## Calculation
//! ```text
//! for each paid order in the shift:
//!     keep payments with status success | paid | settlement | capture
//!     keep only the latest payment per method
//!     cash  → cash_received += amount   (and change_given += order.change)
//!     card / transfer / qris → expected_<method> += amount
//!
//! expected_cash  = opening_balance + cash_received - change_given
//! expected_total = Σ order.total
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::order::{Order, OrderPayment, PaymentMethod};

/// Payment statuses that represent money actually received.
pub const SETTLED_PAYMENT_STATUSES: [&str; 4] = ["success", "paid", "settlement", "capture"];

/// A payment tolerance (rupiah) below which totals mismatches are not logged.
pub const MISMATCH_TOLERANCE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashierShift {
    pub id: String,
    pub business_id: String,
    pub outlet_id: String,
    pub user_id: String,
    pub status: ShiftStatus,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub opening_balance: i64,
    pub expected_cash: i64,
    pub expected_card: i64,
    pub expected_transfer: i64,
    pub expected_qris: i64,
    pub expected_total: i64,
    pub actual_cash: Option<i64>,
    pub actual_card: Option<i64>,
    pub actual_transfer: Option<i64>,
    pub actual_qris: Option<i64>,
    pub actual_total: Option<i64>,
    pub cash_difference: Option<i64>,
    pub total_difference: Option<i64>,
    pub total_transactions: i64,
    pub cash_transactions: i64,
    pub card_transactions: i64,
    pub transfer_transactions: i64,
    pub qris_transactions: i64,
    pub opening_notes: Option<String>,
    pub closing_notes: Option<String>,
    pub closed_by_user_id: Option<String>,
}

/// Expected drawer contents for a set of orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ShiftExpectation {
    pub cash_received: Money,
    pub change_given: Money,
    pub expected_cash: Money,
    pub expected_card: Money,
    pub expected_transfer: Money,
    pub expected_qris: Money,
    pub expected_total: Money,
    pub total_transactions: i64,
    pub cash_transactions: i64,
    pub card_transactions: i64,
    pub transfer_transactions: i64,
    pub qris_transactions: i64,
}

impl ShiftExpectation {
    /// Net cash from sales, without the opening balance.
    pub fn net_cash(&self) -> Money {
        self.cash_received - self.change_given
    }

    /// Sum over methods; differs from `expected_total` when payments are
    /// missing or duplicated upstream.
    pub fn total_from_payments(&self) -> Money {
        self.net_cash() + self.expected_card + self.expected_transfer + self.expected_qris
    }

    pub fn has_mismatch(&self) -> bool {
        (self.expected_total - self.total_from_payments()).abs().rupiah() > MISMATCH_TOLERANCE
    }
}

/// Latest settled payment per method.
fn settled_by_method(payments: &[OrderPayment]) -> HashMap<PaymentMethod, &OrderPayment> {
    let mut latest: HashMap<PaymentMethod, &OrderPayment> = HashMap::new();
    for payment in payments
        .iter()
        .filter(|p| SETTLED_PAYMENT_STATUSES.contains(&p.status.as_str()))
    {
        match latest.get(&payment.method) {
            Some(existing) if existing.created_at >= payment.created_at => {}
            _ => {
                latest.insert(payment.method, payment);
            }
        }
    }
    latest
}

/// Reconciles a shift's paid orders with their payments.
pub fn reconcile(opening_balance: Money, orders: &[(Order, Vec<OrderPayment>)]) -> ShiftExpectation {
    let mut exp = ShiftExpectation {
        total_transactions: orders.len() as i64,
        ..ShiftExpectation::default()
    };

    for (order, payments) in orders {
        exp.expected_total += order.total();

        let by_method = settled_by_method(payments);
        for (method, payment) in &by_method {
            let amount = Money::from_rupiah(payment.amount);
            match method {
                PaymentMethod::Cash => {
                    exp.cash_received += amount;
                    exp.cash_transactions += 1;
                }
                PaymentMethod::Card => {
                    exp.expected_card += amount;
                    exp.card_transactions += 1;
                }
                PaymentMethod::Transfer => {
                    exp.expected_transfer += amount;
                    exp.transfer_transactions += 1;
                }
                PaymentMethod::Qris => {
                    exp.expected_qris += amount;
                    exp.qris_transactions += 1;
                }
            }
        }

        if by_method.contains_key(&PaymentMethod::Cash) {
            exp.change_given += order.change().non_negative();
        }
    }

    exp.expected_cash = opening_balance + exp.net_cash();
    exp
}

impl CashierShift {
    pub fn is_open(&self) -> bool {
        self.status == ShiftStatus::Open
    }

    #[inline]
    pub fn opening_balance(&self) -> Money {
        Money::from_rupiah(self.opening_balance)
    }

    /// Stores a fresh expectation on the shift.
    pub fn apply_expectation(&mut self, exp: &ShiftExpectation) {
        self.expected_cash = exp.expected_cash.rupiah();
        self.expected_card = exp.expected_card.rupiah();
        self.expected_transfer = exp.expected_transfer.rupiah();
        self.expected_qris = exp.expected_qris.rupiah();
        self.expected_total = exp.expected_total.rupiah();
        self.total_transactions = exp.total_transactions;
        self.cash_transactions = exp.cash_transactions;
        self.card_transactions = exp.card_transactions;
        self.transfer_transactions = exp.transfer_transactions;
        self.qris_transactions = exp.qris_transactions;
    }

    /// Closes the shift with the counted cash. Non-cash methods are taken
    /// as matching their expectation.
    pub fn close(
        &mut self,
        exp: &ShiftExpectation,
        actual_cash: Money,
        notes: Option<String>,
        closed_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if !self.is_open() {
            return Err(CoreError::ShiftAlreadyClosed(self.id.clone()));
        }
        if actual_cash.is_negative() {
            return Err(crate::error::ValidationError::MustBePositive {
                field: "actual_cash".to_string(),
            }
            .into());
        }

        self.apply_expectation(exp);

        let actual_total =
            actual_cash + exp.expected_card + exp.expected_transfer + exp.expected_qris;
        self.actual_cash = Some(actual_cash.rupiah());
        self.actual_card = Some(self.expected_card);
        self.actual_transfer = Some(self.expected_transfer);
        self.actual_qris = Some(self.expected_qris);
        self.actual_total = Some(actual_total.rupiah());
        self.cash_difference = Some((actual_cash - exp.expected_cash).rupiah());
        self.total_difference = Some((actual_total - exp.expected_total).rupiah());

        self.status = ShiftStatus::Closed;
        self.closed_at = Some(now);
        self.closing_notes = notes;
        self.closed_by_user_id = Some(closed_by.to_string());
        Ok(())
    }
}
