//! # Orders
//!
//! Order totals, payment application and the status changes that restock
//! inventory.
//!
//! ## Payment Flow
//! ```text
//! ┌──────────┐  pay < total   ┌──────────┐  pay ≥ total   ┌──────────────┐
//! │ pending  │ ─────────────► │ partial  │ ─────────────► │ paid         │
//! │          │ ─────────────────────────────────────────► │ + completed  │
//! └──────────┘          pay ≥ total                       │ + receipt    │
//!                                                          └──────┬───────┘
//!                                                                 │ refund
//!                                                                 ▼
//!                                                          refunded/refunded
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::Product;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    Takeaway,
    Delivery,
    Online,
    SelfService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Orders that earn the handling employee a commission.
    pub const fn earns_commission(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready
        )
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Qris,
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub business_id: String,
    pub outlet_id: String,
    pub employee_id: Option<String>,
    pub shift_id: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: i64,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub service_charge: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub paid_amount: i64,
    /// Negative while partially paid.
    pub change_amount: i64,
    /// Public receipt link token, issued once the order is paid.
    pub receipt_token: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub ordered_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Line item with price and name snapshotted at order time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderPayment {
    pub id: String,
    pub order_id: String,
    pub method: PaymentMethod,
    pub amount: i64,
    /// Free-form gateway status (success, paid, settlement, capture, pending, failed).
    pub status: String,
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Totals
// =============================================================================

/// A requested line before snapshotting.
#[derive(Debug, Clone)]
pub struct OrderLine<'a> {
    pub product: &'a Product,
    pub quantity: i64,
}

/// Priced line: name and unit price copied from the product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: String,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

/// Validates stock and snapshots prices for each line.
pub fn price_lines(lines: &[OrderLine<'_>]) -> CoreResult<Vec<PricedLine>> {
    lines
        .iter()
        .map(|line| {
            if line.quantity <= 0 {
                return Err(crate::error::ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                }
                .into());
            }
            if !line.product.can_sell(line.quantity) {
                return Err(CoreError::InsufficientStock {
                    sku: line.product.sku.clone(),
                    available: line.product.stock,
                    requested: line.quantity,
                });
            }
            let unit_price = line.product.price();
            Ok(PricedLine {
                product_id: line.product.id.clone(),
                product_name: line.product.name.clone(),
                unit_price,
                quantity: line.quantity,
                line_total: unit_price.multiply_quantity(line.quantity),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub service_charge: Money,
    pub delivery_fee: Money,
    pub total: Money,
}

impl OrderTotals {
    /// `total = max(0, subtotal + tax + service + delivery - discount)`.
    pub fn compute(
        lines: &[PricedLine],
        tax: Money,
        discount: Money,
        service_charge: Money,
        delivery_fee: Money,
    ) -> Self {
        let subtotal: Money = lines.iter().map(|l| l.line_total).sum();
        Self::from_parts(subtotal, tax, discount, service_charge, delivery_fee)
    }

    pub fn from_parts(
        subtotal: Money,
        tax: Money,
        discount: Money,
        service_charge: Money,
        delivery_fee: Money,
    ) -> Self {
        OrderTotals {
            subtotal,
            tax,
            discount,
            service_charge,
            delivery_fee,
            total: (subtotal + tax + service_charge + delivery_fee - discount).non_negative(),
        }
    }
}

// =============================================================================
// Order Operations
// =============================================================================

/// Result of applying a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentApplied {
    /// True when this payment settled the order and a receipt token is due.
    pub completed: bool,
    pub change: Money,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_rupiah(self.total)
    }

    #[inline]
    pub fn change(&self) -> Money {
        Money::from_rupiah(self.change_amount)
    }

    fn invalid(&self, action: &str) -> CoreError {
        CoreError::InvalidOrderStatus {
            order_number: self.order_number.clone(),
            current_status: self.status.as_str().to_string(),
            action: action.to_string(),
        }
    }

    /// Adds a payment to the order.
    ///
    /// The caller issues a receipt token when `completed` is true.
    pub fn apply_payment(&mut self, amount: Money) -> CoreResult<PaymentApplied> {
        if !amount.is_positive() {
            return Err(CoreError::InvalidPaymentAmount {
                reason: "amount must be positive".to_string(),
            });
        }
        if self.status.is_closed() {
            return Err(self.invalid("accept payment"));
        }
        if self.payment_status == PaymentStatus::Paid {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("order {} is already paid", self.order_number),
            });
        }

        let paid = Money::from_rupiah(self.paid_amount) + amount;
        self.paid_amount = paid.rupiah();
        self.change_amount = (paid - self.total()).rupiah();

        let completed = self.paid_amount >= self.total;
        if completed {
            self.payment_status = PaymentStatus::Paid;
            self.status = OrderStatus::Completed;
        } else {
            self.payment_status = PaymentStatus::Partial;
        }

        Ok(PaymentApplied {
            completed,
            change: self.change(),
        })
    }

    /// Replaces the discount and recomputes the total. Only unpaid orders.
    pub fn apply_discount(&mut self, discount: Money, code: Option<&str>) -> CoreResult<()> {
        if self.payment_status != PaymentStatus::Pending {
            return Err(self.invalid("apply discount to a paid order"));
        }
        if discount.is_negative() {
            return Err(crate::error::ValidationError::MustBePositive {
                field: "discount_amount".to_string(),
            }
            .into());
        }

        let totals = OrderTotals::from_parts(
            Money::from_rupiah(self.subtotal),
            Money::from_rupiah(self.tax_amount),
            discount,
            Money::from_rupiah(self.service_charge),
            Money::from_rupiah(self.delivery_fee),
        );
        self.discount_amount = discount.rupiah();
        self.total = totals.total.rupiah();

        if let Some(code) = code.filter(|c| !c.trim().is_empty()) {
            let note = format!("Diskon: {}", code.trim());
            self.notes = Some(match self.notes.take() {
                Some(existing) if !existing.is_empty() => format!("{} | {}", existing, note),
                _ => note,
            });
        }
        Ok(())
    }

    /// Cancels the order. The caller restocks every item.
    pub fn cancel(&mut self) -> CoreResult<()> {
        if self.status.is_closed() {
            return Err(self.invalid("cancel"));
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    /// Refunds a paid order. The caller restocks every item.
    pub fn refund(&mut self) -> CoreResult<()> {
        if self.payment_status != PaymentStatus::Paid || self.status.is_closed() {
            return Err(self.invalid("refund"));
        }
        self.status = OrderStatus::Refunded;
        self.payment_status = PaymentStatus::Refunded;
        Ok(())
    }
}

/// `ORD-` followed by the random suffix, uppercased.
pub fn order_number(suffix: &str) -> String {
    format!("ORD-{}", suffix.to_ascii_uppercase())
}

/// Public receipt link.
///
/// ## Example
/// ```rust
/// use kasir_core::order::receipt_url;
///
/// assert_eq!(
///     receipt_url("https://app.example.com/", "abc"),
///     "https://app.example.com/receipt/abc"
/// );
/// ```
pub fn receipt_url(frontend_url: &str, token: &str) -> String {
    format!("{}/receipt/{}", frontend_url.trim_end_matches('/'), token)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn product(id: &str, price: i64, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            business_id: "b-1".to_string(),
            sku: format!("SKU-{}", id),
            name: format!("Produk {}", id),
            description: None,
            price,
            stock,
            track_stock: true,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn order(total: i64) -> Order {
        Order {
            id: "ord-1".to_string(),
            order_number: "ORD-AB12CD34".to_string(),
            business_id: "b-1".to_string(),
            outlet_id: "o-1".to_string(),
            employee_id: None,
            shift_id: None,
            order_type: OrderType::DineIn,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal: total,
            tax_amount: 0,
            discount_amount: 0,
            service_charge: 0,
            delivery_fee: 0,
            total,
            paid_amount: 0,
            change_amount: 0,
            receipt_token: None,
            notes: None,
            ordered_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_totals() {
        let kopi = product("1", 18_000, 10);
        let roti = product("2", 12_500, 10);
        let lines = price_lines(&[
            OrderLine { product: &kopi, quantity: 2 },
            OrderLine { product: &roti, quantity: 1 },
        ])
        .unwrap();

        let totals = OrderTotals::compute(
            &lines,
            Money::from_rupiah(5_335),
            Money::from_rupiah(10_000),
            Money::from_rupiah(2_000),
            Money::zero(),
        );
        assert_eq!(totals.subtotal.rupiah(), 48_500);
        assert_eq!(totals.total.rupiah(), 45_835);
    }

    #[test]
    fn test_total_never_negative() {
        let totals = OrderTotals::from_parts(
            Money::from_rupiah(10_000),
            Money::zero(),
            Money::from_rupiah(50_000),
            Money::zero(),
            Money::zero(),
        );
        assert_eq!(totals.total, Money::zero());
    }

    #[test]
    fn test_totals_at_amount_ceiling_do_not_wrap() {
        let mahal = product("1", i64::MAX / 2, 1_000);
        let lines = price_lines(&[OrderLine { product: &mahal, quantity: 999 }]).unwrap();
        assert_eq!(lines[0].line_total.rupiah(), i64::MAX);

        let totals = OrderTotals::compute(
            &lines,
            Money::from_rupiah(crate::MAX_AMOUNT),
            Money::zero(),
            Money::from_rupiah(crate::MAX_AMOUNT),
            Money::zero(),
        );
        assert_eq!(totals.total.rupiah(), i64::MAX);

        let mut order = order(i64::MAX);
        order.paid_amount = i64::MAX - 1;
        let applied = order.apply_payment(Money::from_rupiah(crate::MAX_AMOUNT)).unwrap();
        assert!(applied.completed);
        assert_eq!(applied.change, Money::zero());
    }

    #[test]
    fn test_insufficient_stock() {
        let kopi = product("1", 18_000, 1);
        let err = price_lines(&[OrderLine { product: &kopi, quantity: 3 }]).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { available: 1, requested: 3, .. }));
    }

    #[test]
    fn test_partial_then_full_payment() {
        let mut o = order(100_000);

        let first = o.apply_payment(Money::from_rupiah(40_000)).unwrap();
        assert!(!first.completed);
        assert_eq!(o.payment_status, PaymentStatus::Partial);
        assert_eq!(o.change_amount, -60_000);

        let second = o.apply_payment(Money::from_rupiah(70_000)).unwrap();
        assert!(second.completed);
        assert_eq!(second.change.rupiah(), 10_000);
        assert_eq!(o.payment_status, PaymentStatus::Paid);
        assert_eq!(o.status, OrderStatus::Completed);

        assert!(o.apply_payment(Money::from_rupiah(1)).is_err());
    }

    #[test]
    fn test_zero_payment_rejected() {
        let mut o = order(100_000);
        assert!(matches!(
            o.apply_payment(Money::zero()),
            Err(CoreError::InvalidPaymentAmount { .. })
        ));
    }

    #[test]
    fn test_discount_only_on_unpaid() {
        let mut o = order(100_000);
        o.tax_amount = 11_000;
        o.apply_discount(Money::from_rupiah(20_000), Some("HEMAT20")).unwrap();
        assert_eq!(o.total, 91_000);
        assert_eq!(o.notes.as_deref(), Some("Diskon: HEMAT20"));

        o.apply_payment(Money::from_rupiah(91_000)).unwrap();
        assert!(o.apply_discount(Money::from_rupiah(1_000), None).is_err());
    }

    #[test]
    fn test_refund_requires_paid() {
        let mut o = order(50_000);
        assert!(o.refund().is_err());

        o.apply_payment(Money::from_rupiah(50_000)).unwrap();
        o.refund().unwrap();
        assert_eq!(o.status, OrderStatus::Refunded);
        assert_eq!(o.payment_status, PaymentStatus::Refunded);
        assert!(o.cancel().is_err());
    }

    #[test]
    fn test_cancel() {
        let mut o = order(50_000);
        o.cancel().unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert!(o.cancel().is_err());
    }

    #[test]
    fn test_commission_statuses() {
        assert!(OrderStatus::Completed.earns_commission());
        assert!(OrderStatus::Ready.earns_commission());
        assert!(!OrderStatus::Pending.earns_commission());
        assert!(!OrderStatus::Cancelled.earns_commission());
    }

    #[test]
    fn test_order_number() {
        assert_eq!(order_number("ab12cd34"), "ORD-AB12CD34");
    }
}
