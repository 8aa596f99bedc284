//! Plan quotas and feature flags for a tenant.
//!
//! ## Counting
//! ```text
//! businesses  per owner
//! outlets     across all of the owner's businesses
//! products    active rows of the tenant business
//! employees   active rows of the tenant business
//! ```

use chrono::{DateTime, Utc};
use kasir_core::features::{
    downgrade_issues, usage_report, DowngradeIssue, FeatureSet, LimitResource, PlanLimits,
    ResourceUsage, Usage,
};
use kasir_core::subscription::{current_active, SubscriptionPlan};
use kasir_core::Business;
use kasir_db::Database;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiResult;

/// Response of `GET /api/subscription/limits`.
#[derive(Debug, Clone, Serialize)]
pub struct LimitsReport {
    pub plan_slug: Option<String>,
    pub limits: PlanLimits,
    pub usage: Vec<ResourceUsage>,
}

#[derive(Clone)]
pub struct LimitsService {
    db: Database,
}

impl LimitsService {
    pub fn new(db: Database) -> Self {
        LimitsService { db }
    }

    /// Plan of the owner's currently active subscription.
    pub async fn active_plan(&self, owner_id: &str, now: DateTime<Utc>) -> ApiResult<Option<SubscriptionPlan>> {
        let history = self.db.subscriptions().history_for_user(owner_id).await?;
        match current_active(&history, now) {
            Some(sub) => Ok(Some(self.db.subscriptions().get_plan(&sub.plan_id).await?)),
            None => Ok(None),
        }
    }

    pub async fn limits_for_owner(&self, owner_id: &str, now: DateTime<Utc>) -> ApiResult<PlanLimits> {
        let plan = self.active_plan(owner_id, now).await?;
        Ok(PlanLimits::for_subscription(plan.as_ref()))
    }

    /// Counts for the tenant business.
    pub async fn usage_for_business(&self, business: &Business) -> ApiResult<Usage> {
        Ok(Usage {
            businesses: self.db.businesses().count_by_owner(&business.owner_id).await?,
            outlets: self.db.outlets().count_for_owner(&business.owner_id).await?,
            products: self.db.products().count_by_business(&business.id).await?,
            employees: self.db.employees().count_by_business(&business.id).await?,
        })
    }

    /// Highest per-business counts across the owner's businesses, used to
    /// judge a downgrade.
    pub async fn peak_usage(&self, owner_id: &str) -> ApiResult<Usage> {
        let businesses = self.db.businesses().list_by_owner(owner_id).await?;
        let mut usage = Usage {
            businesses: businesses.len() as i64,
            outlets: self.db.outlets().count_for_owner(owner_id).await?,
            ..Usage::default()
        };
        for business in &businesses {
            usage.products = usage
                .products
                .max(self.db.products().count_by_business(&business.id).await?);
            usage.employees = usage
                .employees
                .max(self.db.employees().count_by_business(&business.id).await?);
        }
        Ok(usage)
    }

    /// Usage that blocks moving the owner onto `target`.
    pub async fn downgrade_issues(
        &self,
        owner_id: &str,
        target: &SubscriptionPlan,
    ) -> ApiResult<Vec<DowngradeIssue>> {
        let usage = self.peak_usage(owner_id).await?;
        Ok(downgrade_issues(target, &usage))
    }

    /// Fails with `LIMIT_REACHED` when the tenant may not add one more
    /// `resource`.
    pub async fn ensure_can_create(
        &self,
        business: &Business,
        resource: LimitResource,
        now: DateTime<Utc>,
    ) -> ApiResult<()> {
        let limits = self.limits_for_owner(&business.owner_id, now).await?;
        let usage = self.usage_for_business(business).await?;
        let current = usage.get(resource);
        debug!(
            business_id = %business.id,
            resource = resource.as_str(),
            current,
            max = limits.max(resource),
            "Checking plan limit"
        );
        limits.ensure_can_create(resource, current)?;
        Ok(())
    }

    /// Business creation is checked per owner, before any business exists.
    pub async fn ensure_can_create_business(&self, owner_id: &str, now: DateTime<Utc>) -> ApiResult<()> {
        let limits = self.limits_for_owner(owner_id, now).await?;
        let current = self.db.businesses().count_by_owner(owner_id).await?;
        limits.ensure_can_create(LimitResource::Businesses, current)?;
        Ok(())
    }

    pub async fn report(&self, business: &Business, now: DateTime<Utc>) -> ApiResult<LimitsReport> {
        let plan = self.active_plan(&business.owner_id, now).await?;
        let limits = PlanLimits::for_subscription(plan.as_ref());
        let usage = self.usage_for_business(business).await?;
        Ok(LimitsReport {
            plan_slug: plan.map(|p| p.slug),
            limits,
            usage: usage_report(&limits, &usage),
        })
    }

    pub async fn features(&self, business: &Business, now: DateTime<Utc>) -> ApiResult<FeatureSet> {
        let plan = self.active_plan(&business.owner_id, now).await?;
        Ok(FeatureSet::from_plan(plan.as_ref()))
    }
}
