//! # Repository Module
//!
//! Database repository implementations for Kasir.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  service (kasir-api)                                                   │
//! │       │                                                                 │
//! │       │  db.orders().record_payment(&order, &payment)                  │
//! │       ▼                                                                 │
//! │  OrderRepository                                                       │
//! │  ├── create(&order, &items)       ← transaction: insert + stock        │
//! │  ├── get_for_business(business, id)                                    │
//! │  ├── record_payment(...)          ← transaction: payment + totals      │
//! │  └── close_with_restock(...)      ← transaction: status + stock        │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories hold a cloned `SqlitePool` and never decide business rules:
//! the service computes the new state with kasir-core and the repository
//! persists it, guarding multi-row changes with a transaction.
//!
//! ## Available Repositories
//!
//! - [`UserRepository`] - Accounts and WhatsApp verification flag
//! - [`BusinessRepository`] - Businesses and their subscription pointer
//! - [`OutletRepository`] - Outlets
//! - [`ProductRepository`] - Catalog and stock
//! - [`EmployeeRepository`] - Employees and attendance shifts
//! - [`OrderRepository`] - Orders, items, payments
//! - [`CashierShiftRepository`] - Cash drawer shifts
//! - [`SubscriptionRepository`] - Plans, prices, subscriptions, activation
//! - [`OtpRepository`] - WhatsApp OTP codes
//! - [`PayrollRepository`] - Payrolls and payroll items
//! - [`OutboxRepository`] - WhatsApp outbound queue
//! - [`AuditRepository`] - Audit trail

use rand::Rng;
use uuid::Uuid;

pub mod audit;
pub mod business;
pub mod cashier_shift;
pub mod employee;
pub mod order;
pub mod otp;
pub mod outbox;
pub mod outlet;
pub mod payroll;
pub mod product;
pub mod subscription;
pub mod user;

pub use audit::AuditRepository;
pub use business::BusinessRepository;
pub use cashier_shift::CashierShiftRepository;
pub use employee::EmployeeRepository;
pub use order::OrderRepository;
pub use otp::OtpRepository;
pub use outbox::OutboxRepository;
pub use outlet::OutletRepository;
pub use payroll::PayrollRepository;
pub use product::ProductRepository;
pub use subscription::SubscriptionRepository;
pub use user::UserRepository;

/// New UUID v4 primary key.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Uppercase alphanumeric code of `len` characters (order numbers,
/// subscription codes).
pub(crate) fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Mixed-case alphanumeric token for public links.
pub(crate) fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Uniform draw for a 6-digit OTP.
pub(crate) fn random_otp_draw() -> u32 {
    rand::thread_rng().gen_range(0..1_000_000)
}

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use kasir_core::{Business, Outlet, Role, User};

    use super::generate_id;
    use crate::{Database, DbConfig};

    pub(crate) async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub(crate) async fn user(db: &Database, email: &str, role: Role) -> User {
        let now = Utc::now();
        let user = User {
            id: generate_id(),
            name: "Sari".to_string(),
            email: email.to_string(),
            phone: None,
            address: None,
            role,
            password_hash: "hash".to_string(),
            whatsapp_verified_at: None,
            created_at: now,
            updated_at: now,
        };
        db.users().insert(&user).await.unwrap();
        user
    }

    pub(crate) async fn business(db: &Database, owner_id: &str) -> Business {
        let now = Utc::now();
        let business = Business {
            id: generate_id(),
            owner_id: owner_id.to_string(),
            name: "Kopi Senja".to_string(),
            phone: None,
            address: None,
            current_subscription_id: None,
            subscription_expires_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.businesses().insert(&business).await.unwrap();
        business
    }

    pub(crate) async fn outlet(db: &Database, business_id: &str) -> Outlet {
        let now = Utc::now();
        let outlet = Outlet {
            id: generate_id(),
            business_id: business_id.to_string(),
            name: "Pusat".to_string(),
            address: None,
            phone: None,
            working_days: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.outlets().insert(&outlet).await.unwrap();
        outlet
    }

    /// Owner with one business and one outlet.
    pub(crate) async fn tenant(db: &Database) -> (User, Business, Outlet) {
        let owner = user(db, "owner@kopi.id", Role::Owner).await;
        let business = business(db, &owner.id).await;
        let outlet = outlet(db, &business.id).await;
        (owner, business, outlet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_code_charset() {
        let code = random_code(10);
        assert_eq!(code.len(), 10);
        assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
    }

    #[test]
    fn test_random_token_length() {
        let token = random_token(32);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_otp_draw_range() {
        for _ in 0..100 {
            assert!(random_otp_draw() < 1_000_000);
        }
    }
}
