//! # Order Repository
//!
//! Orders, their item snapshots and their payments.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create()            INSERT order + items, stock -= qty   (one tx)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  record_payment()    INSERT payment, UPDATE totals/status (one tx)     │
//! │       │              guarded by the previous paid_amount                │
//! │       ▼                                                                 │
//! │  close_with_restock()  cancel/refund, stock += qty        (one tx)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::product::adjust_stock;
use super::{random_code, random_token};
use crate::error::{DbError, DbResult};
use kasir_core::order::{order_number, Order, OrderItem, OrderPayment};

const SELECT_ORDER: &str = r#"
    SELECT id, order_number, business_id, outlet_id, employee_id, shift_id,
           order_type, status, payment_status, subtotal, tax_amount,
           discount_amount, service_charge, delivery_fee, total, paid_amount,
           change_amount, receipt_token, notes, ordered_at, created_at, updated_at
    FROM orders
"#;

const SELECT_PAYMENT: &str = r#"
    SELECT id, order_id, method, amount, status, reference, created_at
    FROM order_payments
"#;

/// Order statuses counted for employee commission.
const COMMISSION_STATUSES: &str = "'completed', 'confirmed', 'preparing', 'ready'";

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// `ORD-` + 8 random characters, unused so far.
    pub async fn generate_order_number(&self) -> DbResult<String> {
        loop {
            let candidate = order_number(&random_code(8));
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE order_number = ?1")
                .bind(&candidate)
                .fetch_one(&self.pool)
                .await?;
            if exists == 0 {
                return Ok(candidate);
            }
        }
    }

    /// 32-character token for the public receipt link.
    pub fn issue_receipt_token() -> String {
        random_token(32)
    }

    /// Inserts the order and its items and takes the sold quantities out of
    /// stock, all in one transaction.
    pub async fn create(&self, order: &Order, items: &[OrderItem]) -> DbResult<()> {
        debug!(order_number = %order.order_number, items = items.len(), "Creating order");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, business_id, outlet_id, employee_id, shift_id,
                order_type, status, payment_status, subtotal, tax_amount,
                discount_amount, service_charge, delivery_fee, total, paid_amount,
                change_amount, receipt_token, notes, ordered_at, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.business_id)
        .bind(&order.outlet_id)
        .bind(&order.employee_id)
        .bind(&order.shift_id)
        .bind(order.order_type)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.subtotal)
        .bind(order.tax_amount)
        .bind(order.discount_amount)
        .bind(order.service_charge)
        .bind(order.delivery_fee)
        .bind(order.total)
        .bind(order.paid_amount)
        .bind(order.change_amount)
        .bind(&order.receipt_token)
        .bind(&order.notes)
        .bind(order.ordered_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, product_name, unit_price, quantity, line_total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.id)
            .bind(&item.order_id)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.line_total)
            .execute(&mut *tx)
            .await?;

            adjust_stock(&mut tx, &item.product_id, -item.quantity).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(order_number = %order.order_number, total = order.total, "Order created");
        Ok(())
    }

    pub async fn get_for_business(&self, business_id: &str, id: &str) -> DbResult<Order> {
        sqlx::query_as::<_, Order>(&format!("{SELECT_ORDER} WHERE id = ?1 AND business_id = ?2"))
            .bind(id)
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))
    }

    pub async fn get_by_receipt_token(&self, token: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!("{SELECT_ORDER} WHERE receipt_token = ?1"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    /// Most recent first.
    pub async fn list_by_business(&self, business_id: &str, limit: u32) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "{SELECT_ORDER} WHERE business_id = ?1 ORDER BY ordered_at DESC LIMIT ?2"
        ))
        .bind(business_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, product_name, unit_price, quantity, line_total
            FROM order_items WHERE order_id = ?1 ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn payments(&self, order_id: &str) -> DbResult<Vec<OrderPayment>> {
        let payments = sqlx::query_as::<_, OrderPayment>(&format!(
            "{SELECT_PAYMENT} WHERE order_id = ?1 ORDER BY created_at"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Persists a payment together with the order state it produced.
    ///
    /// `order` is the state after `Order::apply_payment`. The update only
    /// lands if the stored paid amount still equals the amount before this
    /// payment, so two concurrent payments cannot both apply.
    pub async fn record_payment(&self, order: &Order, payment: &OrderPayment) -> DbResult<()> {
        debug!(order_number = %order.order_number, amount = payment.amount, "Recording payment");

        let previous_paid = order.paid_amount.saturating_sub(payment.amount);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                paid_amount = ?2,
                change_amount = ?3,
                status = ?4,
                payment_status = ?5,
                receipt_token = ?6,
                updated_at = ?7
            WHERE id = ?1 AND paid_amount = ?8
            "#,
        )
        .bind(&order.id)
        .bind(order.paid_amount)
        .bind(order.change_amount)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(&order.receipt_token)
        .bind(order.updated_at)
        .bind(previous_paid)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Order", &order.id, "payment recorded concurrently"));
        }

        sqlx::query(
            r#"
            INSERT INTO order_payments (id, order_id, method, amount, status, reference, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.method)
        .bind(payment.amount)
        .bind(&payment.status)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    /// Stores a new discount and total while the order is still unpaid.
    pub async fn update_discount(&self, order: &Order) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET discount_amount = ?2, total = ?3, notes = ?4, updated_at = ?5
            WHERE id = ?1 AND payment_status = 'pending'
            "#,
        )
        .bind(&order.id)
        .bind(order.discount_amount)
        .bind(order.total)
        .bind(&order.notes)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Order", &order.id, "order is no longer unpaid"));
        }
        Ok(())
    }

    /// Writes a cancelled/refunded order and puts its items back in stock.
    pub async fn close_with_restock(&self, order: &Order) -> DbResult<()> {
        debug!(order_number = %order.order_number, status = order.status.as_str(), "Closing order");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET status = ?2, payment_status = ?3, updated_at = ?4
            WHERE id = ?1 AND status NOT IN ('cancelled', 'refunded')
            "#,
        )
        .bind(&order.id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Order", &order.id, "order already closed"));
        }

        let items: Vec<(String, i64)> =
            sqlx::query_as("SELECT product_id, quantity FROM order_items WHERE order_id = ?1")
                .bind(&order.id)
                .fetch_all(&mut *tx)
                .await?;
        for (product_id, quantity) in &items {
            adjust_stock(&mut tx, product_id, *quantity).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(order_number = %order.order_number, restocked = items.len(), "Order closed");
        Ok(())
    }

    /// Sum of order totals handled by the employee in `[start, end)`, over
    /// commission-eligible statuses.
    pub async fn commission_sales(
        &self,
        employee_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COALESCE(SUM(total), 0) FROM orders
            WHERE employee_id = ?1 AND ordered_at >= ?2 AND ordered_at < ?3
              AND status IN ({COMMISSION_STATUSES})
            "#
        ))
        .bind(employee_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    /// Paid orders of a cashier shift with all their payments.
    pub async fn paid_orders_for_shift(&self, shift_id: &str) -> DbResult<Vec<(Order, Vec<OrderPayment>)>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "{SELECT_ORDER} WHERE shift_id = ?1 AND payment_status = 'paid' ORDER BY ordered_at"
        ))
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;

        let payments = sqlx::query_as::<_, OrderPayment>(&format!(
            r#"{SELECT_PAYMENT}
            WHERE order_id IN (SELECT id FROM orders WHERE shift_id = ?1 AND payment_status = 'paid')
            ORDER BY created_at"#
        ))
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<String, Vec<OrderPayment>> = HashMap::new();
        for payment in payments {
            by_order.entry(payment.order_id.clone()).or_default().push(payment);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let payments = by_order.remove(&order.id).unwrap_or_default();
                (order, payments)
            })
            .collect())
    }
}
