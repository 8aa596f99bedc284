//! Point-of-sale orders.
//!
//! ## Lifecycle
//! ```text
//! create ──► pending/pending ──pay (partial)──► pending/partial
//!               │                                    │
//!               │ discount (unpaid only)             │ pay (rest)
//!               ▼                                    ▼
//!            cancel ──► cancelled (restock)     completed/paid ──► receipt token
//!                                                    │
//!                                                 refund ──► refunded (restock)
//! ```

use chrono::{DateTime, Utc};
use kasir_core::messages::receipt_message;
use kasir_core::order::{
    price_lines, receipt_url, Order, OrderItem, OrderLine, OrderPayment, OrderStatus, OrderTotals,
    OrderType, PaymentMethod, PaymentStatus,
};
use kasir_core::otp::normalize_phone;
use kasir_core::validation::{validate_payment_amount, validate_phone, validate_price, validate_quantity};
use kasir_core::{Business, MessageKind, Money, Product, User};
use kasir_db::{generate_id, Database, OrderRepository};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub outlet_id: String,
    pub order_type: OrderType,
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub tax_amount: i64,
    #[serde(default)]
    pub discount_amount: i64,
    #[serde(default)]
    pub service_charge: i64,
    #[serde(default)]
    pub delivery_fee: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub amount: i64,
    #[serde(default)]
    pub reference: Option<String>,
    /// Receipt link goes to this WhatsApp number once the order is paid.
    #[serde(default)]
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscountRequest {
    pub discount_amount: i64,
    #[serde(default)]
    pub discount_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<OrderPayment>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResult {
    pub order: Order,
    pub payment: OrderPayment,
    pub completed: bool,
    pub change: Money,
    pub receipt_url: Option<String>,
}

/// Public receipt page data.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub business_name: String,
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<OrderPayment>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Database,
    frontend_url: String,
}

impl OrderService {
    pub fn new(db: Database, frontend_url: impl Into<String>) -> Self {
        OrderService {
            db,
            frontend_url: frontend_url.into(),
        }
    }

    fn receipt_link(&self, order: &Order) -> Option<String> {
        order
            .receipt_token
            .as_deref()
            .map(|token| receipt_url(&self.frontend_url, token))
    }

    /// Creates an order and takes its items out of stock.
    pub async fn create(
        &self,
        business: &Business,
        user: &User,
        req: &CreateOrderRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<OrderDetail> {
        if req.items.is_empty() {
            return Err(ApiError::validation("Order must contain at least one item"));
        }
        for (field, amount) in [
            ("tax_amount", req.tax_amount),
            ("discount_amount", req.discount_amount),
            ("service_charge", req.service_charge),
            ("delivery_fee", req.delivery_fee),
        ] {
            validate_price(field, amount)?;
        }

        let outlet = self.db.outlets().get_for_business(&business.id, &req.outlet_id).await?;

        let mut products: Vec<Product> = Vec::with_capacity(req.items.len());
        for line in &req.items {
            validate_quantity(line.quantity)?;
            let product = self
                .db
                .products()
                .get_for_business(&business.id, &line.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| ApiError::not_found("Product", &line.product_id))?;
            products.push(product);
        }
        let lines: Vec<OrderLine<'_>> = products
            .iter()
            .zip(&req.items)
            .map(|(product, line)| OrderLine {
                product,
                quantity: line.quantity,
            })
            .collect();
        let priced = price_lines(&lines)?;
        let totals = OrderTotals::compute(
            &priced,
            Money::from_rupiah(req.tax_amount),
            Money::from_rupiah(req.discount_amount),
            Money::from_rupiah(req.service_charge),
            Money::from_rupiah(req.delivery_fee),
        );

        let shift = self.db.cashier_shifts().find_open(&user.id, &outlet.id).await?;
        let employee_id = match &req.employee_id {
            Some(id) => Some(self.db.employees().get_for_business(&business.id, id).await?.id),
            None => self
                .db
                .employees()
                .find_by_user_id(&user.id)
                .await?
                .filter(|e| e.business_id == business.id)
                .map(|e| e.id),
        };

        let order = Order {
            id: generate_id(),
            order_number: self.db.orders().generate_order_number().await?,
            business_id: business.id.clone(),
            outlet_id: outlet.id.clone(),
            employee_id,
            shift_id: shift.map(|s| s.id),
            order_type: req.order_type,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal: totals.subtotal.rupiah(),
            tax_amount: totals.tax.rupiah(),
            discount_amount: totals.discount.rupiah(),
            service_charge: totals.service_charge.rupiah(),
            delivery_fee: totals.delivery_fee.rupiah(),
            total: totals.total.rupiah(),
            paid_amount: 0,
            change_amount: 0,
            receipt_token: None,
            notes: req.notes.clone(),
            ordered_at: now,
            created_at: now,
            updated_at: now,
        };
        let items: Vec<OrderItem> = priced
            .into_iter()
            .map(|line| OrderItem {
                id: generate_id(),
                order_id: order.id.clone(),
                product_id: line.product_id,
                product_name: line.product_name,
                unit_price: line.unit_price.rupiah(),
                quantity: line.quantity,
                line_total: line.line_total.rupiah(),
            })
            .collect();

        self.db.orders().create(&order, &items).await?;
        Ok(OrderDetail {
            order,
            items,
            payments: Vec::new(),
            receipt_url: None,
        })
    }

    pub async fn get(&self, business: &Business, id: &str) -> ApiResult<OrderDetail> {
        let order = self.db.orders().get_for_business(&business.id, id).await?;
        let items = self.db.orders().items(&order.id).await?;
        let payments = self.db.orders().payments(&order.id).await?;
        Ok(OrderDetail {
            receipt_url: self.receipt_link(&order),
            order,
            items,
            payments,
        })
    }

    pub async fn list(&self, business: &Business, limit: u32) -> ApiResult<Vec<Order>> {
        Ok(self.db.orders().list_by_business(&business.id, limit).await?)
    }

    /// Takes a (possibly partial) payment.
    pub async fn pay(
        &self,
        business: &Business,
        id: &str,
        req: &PaymentRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<PaymentResult> {
        validate_payment_amount(req.amount)?;
        if let Some(phone) = &req.customer_phone {
            validate_phone(phone)?;
        }

        let mut order = self.db.orders().get_for_business(&business.id, id).await?;
        let applied = order.apply_payment(Money::from_rupiah(req.amount))?;
        if applied.completed && order.receipt_token.is_none() {
            order.receipt_token = Some(OrderRepository::issue_receipt_token());
        }
        order.updated_at = now;

        let payment = OrderPayment {
            id: generate_id(),
            order_id: order.id.clone(),
            method: req.method,
            amount: req.amount,
            status: "paid".to_string(),
            reference: req.reference.clone(),
            created_at: now,
        };
        self.db.orders().record_payment(&order, &payment).await?;

        let receipt_url = self.receipt_link(&order);
        if let (true, Some(phone), Some(url)) = (applied.completed, &req.customer_phone, &receipt_url) {
            let text = receipt_message(&business.name, &order.order_number, order.total(), url);
            if let Err(e) = self
                .db
                .outbox()
                .enqueue(&normalize_phone(phone), &text, MessageKind::Receipt, Some(&order.id))
                .await
            {
                warn!(order_number = %order.order_number, "Failed to queue receipt: {}", e);
            }
        }

        info!(
            order_number = %order.order_number,
            amount = req.amount,
            completed = applied.completed,
            "Order payment recorded"
        );
        Ok(PaymentResult {
            order,
            payment,
            completed: applied.completed,
            change: applied.change,
            receipt_url,
        })
    }

    pub async fn apply_discount(
        &self,
        business: &Business,
        id: &str,
        req: &DiscountRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<Order> {
        let mut order = self.db.orders().get_for_business(&business.id, id).await?;
        order.apply_discount(Money::from_rupiah(req.discount_amount), req.discount_code.as_deref())?;
        order.updated_at = now;
        self.db.orders().update_discount(&order).await?;
        Ok(order)
    }

    pub async fn cancel(&self, business: &Business, id: &str, now: DateTime<Utc>) -> ApiResult<Order> {
        let mut order = self.db.orders().get_for_business(&business.id, id).await?;
        order.cancel()?;
        order.updated_at = now;
        self.db.orders().close_with_restock(&order).await?;
        Ok(order)
    }

    pub async fn refund(&self, business: &Business, id: &str, now: DateTime<Utc>) -> ApiResult<Order> {
        let mut order = self.db.orders().get_for_business(&business.id, id).await?;
        order.refund()?;
        order.updated_at = now;
        self.db.orders().close_with_restock(&order).await?;
        Ok(order)
    }

    /// Public receipt lookup by token.
    pub async fn receipt(&self, token: &str) -> ApiResult<Receipt> {
        let order = self
            .db
            .orders()
            .get_by_receipt_token(token)
            .await?
            .ok_or_else(|| ApiError::not_found("Receipt", token))?;
        let business = self.db.businesses().require(&order.business_id).await?;
        let items = self.db.orders().items(&order.id).await?;
        let payments = self.db.orders().payments(&order.id).await?;
        Ok(Receipt {
            business_name: business.name,
            order,
            items,
            payments,
        })
    }
}
