//! Service layer.
//!
//! Each service owns a `Database` handle (cheap to clone) and orchestrates
//! kasir-core rules over kasir-db repositories. Handlers in `routes` stay
//! thin: extract, call one service method, wrap the result.

pub mod health;
pub mod limits;
pub mod order;
pub mod otp;
pub mod payroll;
pub mod shift;
pub mod subscription;
pub mod sweep;
pub mod webhook;

pub use health::HealthService;
pub use limits::LimitsService;
pub use order::OrderService;
pub use otp::OtpService;
pub use payroll::PayrollService;
pub use shift::ShiftService;
pub use subscription::SubscriptionService;
pub use sweep::{LogSender, MessageSender, SweepService};
pub use webhook::WebhookService;

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the service tests.

    use chrono::{DateTime, Duration, Utc};
    use kasir_core::subscription::{DurationType, SubscriptionPlan, SubscriptionPlanPrice};
    use kasir_core::{Business, Role, User, TRIAL_PLAN_SLUG};
    use kasir_db::{generate_id, Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub async fn user(db: &Database, role: Role, complete: bool) -> User {
        let now = Utc::now();
        let id = generate_id();
        let user = User {
            id: id.clone(),
            name: "Budi Santoso".to_string(),
            email: format!("{}@example.id", &id[..8]),
            phone: complete.then(|| "6281234567890".to_string()),
            address: complete.then(|| "Jl. Merdeka 1, Bandung".to_string()),
            role,
            password_hash: String::new(),
            whatsapp_verified_at: complete.then_some(now),
            created_at: now,
            updated_at: now,
        };
        db.users().insert(&user).await.unwrap();
        user
    }

    pub async fn business(db: &Database, owner: &User) -> Business {
        let now = Utc::now();
        let business = Business {
            id: generate_id(),
            owner_id: owner.id.clone(),
            name: "Warung Budi".to_string(),
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

    /// Plan with the given limits `[outlets, products, employees]` and one
    /// monthly price.
    pub async fn plan(
        db: &Database,
        slug: &str,
        sort_order: i64,
        limits: [i64; 3],
        monthly_price: i64,
    ) -> (SubscriptionPlan, SubscriptionPlanPrice) {
        let now = Utc::now();
        let plan = SubscriptionPlan {
            id: generate_id(),
            name: slug.to_string(),
            slug: slug.to_string(),
            description: None,
            max_businesses: 1,
            max_outlets: limits[0],
            max_products: limits[1],
            max_employees: limits[2],
            has_reports_access: true,
            has_advanced_reports: false,
            has_kitchen_access: slug != TRIAL_PLAN_SLUG,
            has_tables_access: false,
            has_attendance_access: true,
            has_inventory_access: false,
            has_promo_access: false,
            has_stock_transfer_access: false,
            has_self_service_access: false,
            has_online_integration: false,
            has_api_access: false,
            has_multi_location: false,
            features: "[]".to_string(),
            is_active: true,
            is_popular: false,
            cta_text: None,
            sort_order,
            created_at: now,
            updated_at: now,
        };
        db.subscriptions().insert_plan(&plan).await.unwrap();

        let price = SubscriptionPlanPrice {
            id: generate_id(),
            plan_id: plan.id.clone(),
            duration_type: DurationType::Monthly,
            duration_months: 1,
            original_price: monthly_price,
            final_price: monthly_price,
            discount_percentage: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.subscriptions().insert_price(&price).await.unwrap();
        (plan, price)
    }

    pub fn days_ago(days: i64) -> DateTime<Utc> {
        Utc::now() - Duration::days(days)
    }
}
