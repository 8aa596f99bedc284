//! # Features & Plan Limits
//!
//! Feature flags and resource quotas granted by a subscription plan.
//!
//! ## Quota Semantics
//! ```text
//! max = -1   unlimited, never blocks creation or downgrade
//! max =  n   creation allowed while current < n
//!            downgrade blocked while current > n
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::subscription::SubscriptionPlan;
use crate::UNLIMITED;

// =============================================================================
// Feature Flags
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Reports,
    AdvancedReports,
    Kitchen,
    Tables,
    Attendance,
    Inventory,
    Promo,
    StockTransfer,
    SelfService,
    OnlineIntegration,
    ApiAccess,
    MultiLocation,
    /// Face check-in on attendance. Rides on the attendance flag.
    FaceRecognition,
}

impl Feature {
    pub const ALL: [Feature; 13] = [
        Feature::Reports,
        Feature::AdvancedReports,
        Feature::Kitchen,
        Feature::Tables,
        Feature::Attendance,
        Feature::Inventory,
        Feature::Promo,
        Feature::StockTransfer,
        Feature::SelfService,
        Feature::OnlineIntegration,
        Feature::ApiAccess,
        Feature::MultiLocation,
        Feature::FaceRecognition,
    ];
}

impl SubscriptionPlan {
    pub fn has_feature(&self, feature: Feature) -> bool {
        match feature {
            Feature::Reports => self.has_reports_access || self.has_advanced_reports,
            Feature::AdvancedReports => self.has_advanced_reports,
            Feature::Kitchen => self.has_kitchen_access,
            Feature::Tables => self.has_tables_access,
            Feature::Attendance | Feature::FaceRecognition => self.has_attendance_access,
            Feature::Inventory => self.has_inventory_access,
            Feature::Promo => self.has_promo_access,
            Feature::StockTransfer => self.has_stock_transfer_access,
            Feature::SelfService => self.has_self_service_access,
            Feature::OnlineIntegration => self.has_online_integration,
            Feature::ApiAccess => self.has_api_access,
            Feature::MultiLocation => self.has_multi_location,
        }
    }
}

/// Flag map served by `GET /features`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct FeatureSet {
    pub plan_slug: Option<String>,
    pub features: Vec<(Feature, bool)>,
}

impl FeatureSet {
    /// Everything is off without a subscription.
    pub fn from_plan(plan: Option<&SubscriptionPlan>) -> Self {
        FeatureSet {
            plan_slug: plan.map(|p| p.slug.clone()),
            features: Feature::ALL
                .iter()
                .map(|f| (*f, plan.is_some_and(|p| p.has_feature(*f))))
                .collect(),
        }
    }

    pub fn allows(&self, feature: Feature) -> bool {
        self.features
            .iter()
            .any(|(f, enabled)| *f == feature && *enabled)
    }
}

// =============================================================================
// Limits
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LimitResource {
    Businesses,
    Outlets,
    Products,
    Employees,
}

impl LimitResource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LimitResource::Businesses => "businesses",
            LimitResource::Outlets => "outlets",
            LimitResource::Products => "products",
            LimitResource::Employees => "employees",
        }
    }

    /// Indonesian noun used in user-facing messages.
    const fn label(&self) -> &'static str {
        match self {
            LimitResource::Businesses => "bisnis",
            LimitResource::Outlets => "outlet",
            LimitResource::Products => "produk",
            LimitResource::Employees => "karyawan",
        }
    }
}

/// Resource quotas; `-1` is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlanLimits {
    pub max_businesses: i64,
    pub max_outlets: i64,
    pub max_products: i64,
    pub max_employees: i64,
}

impl PlanLimits {
    /// Quotas when the owner has no active subscription at all.
    pub const NO_SUBSCRIPTION: PlanLimits = PlanLimits {
        max_businesses: 1,
        max_outlets: 1,
        max_products: 10,
        max_employees: 2,
    };

    /// Reads the plan's quotas. A zero stored for outlets, products or
    /// employees is treated as missing and falls back to 1/100/5.
    pub fn from_plan(plan: &SubscriptionPlan) -> Self {
        let or_default = |v: i64, default: i64| if v == 0 { default } else { v };
        PlanLimits {
            max_businesses: or_default(plan.max_businesses, 1),
            max_outlets: or_default(plan.max_outlets, 1),
            max_products: or_default(plan.max_products, 100),
            max_employees: or_default(plan.max_employees, 5),
        }
    }

    pub fn for_subscription(plan: Option<&SubscriptionPlan>) -> Self {
        plan.map_or(Self::NO_SUBSCRIPTION, Self::from_plan)
    }

    pub const fn max(&self, resource: LimitResource) -> i64 {
        match resource {
            LimitResource::Businesses => self.max_businesses,
            LimitResource::Outlets => self.max_outlets,
            LimitResource::Products => self.max_products,
            LimitResource::Employees => self.max_employees,
        }
    }

    /// True when one more `resource` may be created.
    pub fn can_create(&self, resource: LimitResource, current: i64) -> bool {
        let max = self.max(resource);
        max == UNLIMITED || current < max
    }

    /// Errors with `LimitReached` when creation is not allowed.
    pub fn ensure_can_create(&self, resource: LimitResource, current: i64) -> crate::CoreResult<()> {
        if self.can_create(resource, current) {
            return Ok(());
        }
        Err(crate::CoreError::LimitReached {
            resource: resource.as_str().to_string(),
            current,
            max: self.max(resource),
        })
    }
}

/// Current counts for an owner. Outlets span all of the owner's businesses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Usage {
    pub businesses: i64,
    pub outlets: i64,
    pub products: i64,
    pub employees: i64,
}

impl Usage {
    pub const fn get(&self, resource: LimitResource) -> i64 {
        match resource {
            LimitResource::Businesses => self.businesses,
            LimitResource::Outlets => self.outlets,
            LimitResource::Products => self.products,
            LimitResource::Employees => self.employees,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ResourceUsage {
    pub resource: LimitResource,
    pub current: i64,
    pub max: i64,
    /// `None` when unlimited.
    pub remaining: Option<i64>,
    pub can_create: bool,
    pub over_limit: bool,
}

/// Per-resource usage against limits, served by `GET /subscription/limits`.
pub fn usage_report(limits: &PlanLimits, usage: &Usage) -> Vec<ResourceUsage> {
    [
        LimitResource::Businesses,
        LimitResource::Outlets,
        LimitResource::Products,
        LimitResource::Employees,
    ]
    .into_iter()
    .map(|resource| {
        let current = usage.get(resource);
        let max = limits.max(resource);
        let unlimited = max == UNLIMITED;
        ResourceUsage {
            resource,
            current,
            max,
            remaining: (!unlimited).then(|| (max - current).max(0)),
            can_create: limits.can_create(resource, current),
            over_limit: !unlimited && current > max,
        }
    })
    .collect()
}

// =============================================================================
// Downgrade Feasibility
// =============================================================================

/// One reason a downgrade cannot proceed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DowngradeIssue {
    #[serde(rename = "type")]
    pub issue_type: LimitResource,
    pub message: String,
    pub current: i64,
    pub max: i64,
    pub action_required: String,
}

/// Usage that exceeds the target plan. Empty means the downgrade may proceed.
///
/// Only outlets, products and employees are checked; business count is
/// enforced at creation time.
pub fn downgrade_issues(target: &SubscriptionPlan, usage: &Usage) -> Vec<DowngradeIssue> {
    let limits = PlanLimits::from_plan(target);

    [
        LimitResource::Outlets,
        LimitResource::Products,
        LimitResource::Employees,
    ]
    .into_iter()
    .filter_map(|resource| {
        let current = usage.get(resource);
        let max = limits.max(resource);
        if max == UNLIMITED || current <= max {
            return None;
        }
        let label = resource.label();
        let verb = if resource == LimitResource::Products {
            "Hapus"
        } else {
            "Hapus atau nonaktifkan"
        };
        Some(DowngradeIssue {
            issue_type: resource,
            message: format!(
                "Anda memiliki {} {}, tetapi paket {} hanya mengizinkan {} {}.",
                current, label, target.name, max, label
            ),
            current,
            max,
            action_required: format!("{} {} {} sebelum downgrade.", verb, current - max, label),
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::tests::plan;

    #[test]
    fn test_feature_fallbacks() {
        let mut p = plan("p", "basic", 1);
        p.has_reports_access = false;
        p.has_advanced_reports = true;
        p.has_attendance_access = true;
        assert!(p.has_feature(Feature::Reports));
        assert!(p.has_feature(Feature::FaceRecognition));
        assert!(!p.has_feature(Feature::Kitchen));
    }

    #[test]
    fn test_feature_set_without_subscription() {
        let set = FeatureSet::from_plan(None);
        assert!(set.plan_slug.is_none());
        assert!(Feature::ALL.iter().all(|f| !set.allows(*f)));
    }

    #[test]
    fn test_limits_defaults() {
        let mut p = plan("p", "basic", 1);
        p.max_outlets = 0;
        p.max_products = 0;
        p.max_employees = 0;
        let limits = PlanLimits::from_plan(&p);
        assert_eq!(limits.max_outlets, 1);
        assert_eq!(limits.max_products, 100);
        assert_eq!(limits.max_employees, 5);

        assert_eq!(PlanLimits::for_subscription(None), PlanLimits::NO_SUBSCRIPTION);
    }

    #[test]
    fn test_can_create() {
        let limits = PlanLimits {
            max_businesses: 1,
            max_outlets: 2,
            max_products: UNLIMITED,
            max_employees: 10,
        };
        assert!(limits.can_create(LimitResource::Outlets, 1));
        assert!(!limits.can_create(LimitResource::Outlets, 2));
        assert!(limits.can_create(LimitResource::Products, 1_000_000));

        let err = limits.ensure_can_create(LimitResource::Businesses, 1).unwrap_err();
        assert_eq!(err.to_string(), "Limit reached for businesses: 1/1");
    }

    #[test]
    fn test_usage_report() {
        let limits = PlanLimits {
            max_businesses: 1,
            max_outlets: 2,
            max_products: UNLIMITED,
            max_employees: 10,
        };
        let usage = Usage {
            businesses: 1,
            outlets: 3,
            products: 42,
            employees: 4,
        };
        let report = usage_report(&limits, &usage);
        let outlets = report.iter().find(|r| r.resource == LimitResource::Outlets).unwrap();
        assert!(outlets.over_limit);
        assert_eq!(outlets.remaining, Some(0));
        let products = report.iter().find(|r| r.resource == LimitResource::Products).unwrap();
        assert_eq!(products.remaining, None);
        assert!(products.can_create);
    }

    #[test]
    fn test_downgrade_blocked_by_usage() {
        let basic = plan("p-basic", "Basic", 1);
        let usage = Usage {
            businesses: 1,
            outlets: 4,
            products: 600,
            employees: 3,
        };
        let issues = downgrade_issues(&basic, &usage);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].issue_type, LimitResource::Outlets);
        assert_eq!(
            issues[0].action_required,
            "Hapus atau nonaktifkan 2 outlet sebelum downgrade."
        );
        assert_eq!(issues[1].action_required, "Hapus 100 produk sebelum downgrade.");
        assert!(issues[1].message.contains("paket Basic hanya mengizinkan 500 produk"));
    }

    #[test]
    fn test_unlimited_never_blocks_downgrade() {
        let mut ent = plan("p-ent", "enterprise", 3);
        ent.max_outlets = UNLIMITED;
        ent.max_products = UNLIMITED;
        ent.max_employees = UNLIMITED;
        let usage = Usage {
            businesses: 9,
            outlets: 900,
            products: 90_000,
            employees: 900,
        };
        assert!(downgrade_issues(&ent, &usage).is_empty());
    }

    #[test]
    fn test_issue_serializes_type_field() {
        let basic = plan("p-basic", "Basic", 1);
        let usage = Usage {
            outlets: 3,
            ..Usage::default()
        };
        let json = serde_json::to_value(&downgrade_issues(&basic, &usage)[0]).unwrap();
        assert_eq!(json["type"], "outlets");
    }
}
