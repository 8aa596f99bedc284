//! # Domain Types
//!
//! Tenant-level entities shared by every other module.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tenant Model                                    │
//! │                                                                         │
//! │  User (owner) ──owns──► Business ──has──► Outlet ──has──► Product       │
//! │      │                     │                                            │
//! │      │                     └──employs──► Employee ──works──► Shift      │
//! │      │                                       │                          │
//! │      └──subscribes──► UserSubscription       └──(optional) User login  │
//! │                                                                         │
//! │  Employees (admin/kasir/kitchen/waiter) never hold a subscription:     │
//! │  they act under the subscription of their business owner.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity uses a UUID v4 string `id`. Human-readable identifiers
//! (order_number, subscription_code, payroll_number) are separate columns.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1100 bps = 11% (PPN)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Role
// =============================================================================

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Business owner, holds the subscription.
    Owner,
    /// Outlet administrator employed by an owner.
    Admin,
    /// Cashier.
    Kasir,
    Kitchen,
    Waiter,
    /// Platform operator.
    SuperAdmin,
}

impl Role {
    /// Employee roles resolve subscription access through the business owner.
    pub const fn is_employee(&self) -> bool {
        matches!(self, Role::Admin | Role::Kasir | Role::Kitchen | Role::Waiter)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Kasir => "kasir",
            Role::Kitchen => "kitchen",
            Role::Waiter => "waiter",
            Role::SuperAdmin => "super_admin",
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// A login account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    /// Argon2 PHC string. Never leaves the server.
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub password_hash: String,
    #[ts(as = "Option<String>")]
    pub whatsapp_verified_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fields that must be filled before a subscription can be purchased.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let missing = user.missing_profile_fields();
    /// // ["phone", "whatsapp_verified"]
    /// ```
    pub fn missing_profile_fields(&self) -> Vec<String> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name".to_string());
        }
        if blank(&self.phone) {
            missing.push("phone".to_string());
        }
        if blank(&self.address) {
            missing.push("address".to_string());
        }
        if self.whatsapp_verified_at.is_none() {
            missing.push("whatsapp_verified".to_string());
        }
        missing
    }
}

// =============================================================================
// Business & Outlet
// =============================================================================

/// A tenant business owned by one owner account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Business {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Subscription currently powering this business.
    pub current_subscription_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Default working week: Monday through Friday (0 = Sunday).
pub const DEFAULT_WORKING_DAYS: [u32; 5] = [1, 2, 3, 4, 5];

/// A physical location of a business.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Outlet {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    /// JSON array of weekday numbers, 0 = Sunday. NULL means the default week.
    pub working_days: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Outlet {
    /// Working weekdays for attendance and payroll.
    ///
    /// Falls back to Monday–Friday when the column is empty, unparsable, or
    /// contains no valid weekday.
    pub fn working_days(&self) -> Vec<u32> {
        let parsed: Vec<u32> = self
            .working_days
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<u32>>(raw).ok())
            .unwrap_or_default()
            .into_iter()
            .filter(|d| *d <= 6)
            .collect();

        if parsed.is_empty() {
            DEFAULT_WORKING_DAYS.to_vec()
        } else {
            parsed
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product sold by a business.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub business_id: String,
    /// Stock Keeping Unit, unique within the business.
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    /// Selling price in rupiah.
    pub price: i64,
    /// Current stock level.
    pub stock: i64,
    /// Whether stock is decremented on sale.
    pub track_stock: bool,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_rupiah(self.price)
    }

    /// Checks if `quantity` units can be sold.
    pub fn can_sell(&self, quantity: i64) -> bool {
        !self.track_stock || self.stock >= quantity
    }
}

// =============================================================================
// Employee
// =============================================================================

/// A person employed by a business, optionally linked to a login account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Employee {
    pub id: String,
    pub business_id: String,
    pub user_id: Option<String>,
    /// Outlet used for the working-day calendar in payroll.
    pub outlet_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    /// Monthly base salary in rupiah.
    pub salary: i64,
    /// Commission on paid orders, basis points.
    pub commission_rate_bps: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Attendance Shift
// =============================================================================

/// Attendance state of a scheduled work shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Scheduled,
    Completed,
    Late,
    Absent,
    Cancelled,
}

impl AttendanceStatus {
    /// Present days count completed and late shifts.
    pub const fn is_present(&self) -> bool {
        matches!(self, AttendanceStatus::Completed | AttendanceStatus::Late)
    }
}

/// A scheduled shift with clock times, as recorded by the attendance module.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct EmployeeShift {
    pub id: String,
    pub employee_id: String,
    pub outlet_id: Option<String>,
    #[ts(as = "String")]
    pub shift_date: NaiveDate,
    #[ts(as = "Option<String>")]
    pub start_time: Option<NaiveTime>,
    #[ts(as = "Option<String>")]
    pub end_time: Option<NaiveTime>,
    #[ts(as = "Option<String>")]
    pub clock_in: Option<NaiveTime>,
    #[ts(as = "Option<String>")]
    pub clock_out: Option<NaiveTime>,
    pub status: AttendanceStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit Log
// =============================================================================

/// Append-only record of a state-changing action.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditLog {
    pub id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    /// JSON payload with before/after details.
    pub details: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// WhatsApp Outbox
// =============================================================================

/// What a queued WhatsApp message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Otp,
    Reminder,
    Receipt,
}

/// A WhatsApp message waiting for the delivery worker.
///
/// Rows are written in the same transaction as the change that caused them;
/// a separate worker drains `sent_at IS NULL` rows.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OutboxMessage {
    pub id: String,
    /// Normalized `62...` number.
    pub phone: String,
    pub message: String,
    pub kind: MessageKind,
    /// Entity the message refers to (subscription, order, phone).
    pub reference_id: Option<String>,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub sent_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn outlet(working_days: Option<&str>) -> Outlet {
        Outlet {
            id: "o-1".to_string(),
            business_id: "b-1".to_string(),
            name: "Pusat".to_string(),
            address: None,
            phone: None,
            working_days: working_days.map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user() -> User {
        User {
            id: "u-1".to_string(),
            name: "Sari".to_string(),
            email: "sari@example.com".to_string(),
            phone: Some("08123456789".to_string()),
            address: Some("Jl. Merdeka 1".to_string()),
            role: Role::Owner,
            password_hash: String::new(),
            whatsapp_verified_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_employee_roles() {
        assert!(Role::Kasir.is_employee());
        assert!(Role::Admin.is_employee());
        assert!(!Role::Owner.is_employee());
        assert!(!Role::SuperAdmin.is_employee());
    }

    #[test]
    fn test_working_days_default() {
        assert_eq!(outlet(None).working_days(), vec![1, 2, 3, 4, 5]);
        assert_eq!(outlet(Some("not json")).working_days(), vec![1, 2, 3, 4, 5]);
        assert_eq!(outlet(Some("[]")).working_days(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_working_days_custom() {
        assert_eq!(outlet(Some("[1,2,3,4,5,6]")).working_days(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(outlet(Some("[0,9]")).working_days(), vec![0]);
    }

    #[test]
    fn test_complete_profile() {
        assert!(user().missing_profile_fields().is_empty());
    }

    #[test]
    fn test_incomplete_profile() {
        let mut u = user();
        u.phone = Some("  ".to_string());
        u.address = None;
        u.whatsapp_verified_at = None;
        assert_eq!(
            u.missing_profile_fields(),
            vec!["phone", "address", "whatsapp_verified"]
        );
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let mut u = user();
        u.password_hash = "$argon2id$secret".to_string();
        let json = serde_json::to_string(&u).unwrap();
        assert!(!json.contains("argon2"));
    }
}
