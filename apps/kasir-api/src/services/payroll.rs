//! Monthly payroll runs.
//!
//! ## Lifecycle
//! ```text
//! generate ──► calculated ──approve──► approved ──pay──► paid
//!     ▲            │                      │
//!     └────────────┴───────cancel─────────┘──► cancelled ──► (regenerate)
//! ```
//! Regenerating a calculated or cancelled payroll overwrites the figures in
//! place; the id and payroll number survive.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use kasir_core::payroll::{
    calculate, month_bounds, payroll_number, Payroll, PayrollCalculation, PayrollInput, PayrollItem,
    PayrollOptions, PayrollStatus,
};
use kasir_core::validation::validate_month;
use kasir_core::{Business, CoreError, Employee, Money, DEFAULT_WORKING_DAYS};
use kasir_db::{generate_id, Database};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiResult;

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratePayrollRequest {
    pub employee_id: String,
    pub year: i32,
    pub month: u32,
    #[serde(flatten)]
    pub options: PayrollOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateAllRequest {
    pub year: i32,
    pub month: u32,
    #[serde(flatten)]
    pub options: PayrollOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayrollDetail {
    #[serde(flatten)]
    pub payroll: Payroll,
    pub items: Vec<PayrollItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation: Option<PayrollCalculation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEmployee {
    pub employee_id: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateAllResult {
    pub generated: Vec<Payroll>,
    pub skipped: Vec<SkippedEmployee>,
}

/// `[start 00:00, end + 1 day 00:00)` in UTC.
fn commission_window(start: NaiveDate, end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = start.and_time(NaiveTime::MIN).and_utc();
    let to = (end.and_time(NaiveTime::MIN) + Duration::days(1)).and_utc();
    (from, to)
}

#[derive(Clone)]
pub struct PayrollService {
    db: Database,
}

impl PayrollService {
    pub fn new(db: Database) -> Self {
        PayrollService { db }
    }

    async fn working_days(&self, employee: &Employee) -> ApiResult<Vec<u32>> {
        match &employee.outlet_id {
            Some(outlet_id) => {
                let outlet = self
                    .db
                    .outlets()
                    .get_for_business(&employee.business_id, outlet_id)
                    .await?;
                Ok(outlet.working_days())
            }
            None => Ok(DEFAULT_WORKING_DAYS.to_vec()),
        }
    }

    /// Calculates (or recalculates) one employee's payroll for a month.
    pub async fn generate(
        &self,
        business: &Business,
        req: &GeneratePayrollRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<PayrollDetail> {
        let employee = self
            .db
            .employees()
            .get_for_business(&business.id, &req.employee_id)
            .await?;
        self.generate_for(business, &employee, req.year, req.month, &req.options, now)
            .await
    }

    async fn generate_for(
        &self,
        business: &Business,
        employee: &Employee,
        year: i32,
        month: u32,
        options: &PayrollOptions,
        now: DateTime<Utc>,
    ) -> ApiResult<PayrollDetail> {
        validate_month(month)?;
        options.validate()?;
        let (year_key, month_key) = (i64::from(year), i64::from(month));

        let existing = self.db.payrolls().find(&employee.id, year_key, month_key).await?;
        if let Some(stored) = &existing {
            if !stored.status.can_recalculate() {
                return Err(CoreError::InvalidPayrollStatus {
                    payroll_number: stored.payroll_number.clone(),
                    current_status: stored.status.as_str().to_string(),
                    action: "recalculate".to_string(),
                }
                .into());
            }
        }

        let working_days = self.working_days(employee).await?;
        let (start, end) = month_bounds(year, month)?;
        let shifts = self.db.employees().shifts_in_period(&employee.id, start, end).await?;
        let (from, to) = commission_window(start, end);
        let sales = self.db.orders().commission_sales(&employee.id, from, to).await?;

        let calc = calculate(&PayrollInput {
            employee,
            year,
            month,
            working_days: &working_days,
            shifts: &shifts,
            commission_sales: Money::from_rupiah(sales),
            options,
        })?;
        if !calc.incomplete_shifts.is_empty() {
            warn!(
                employee_id = %employee.id,
                count = calc.incomplete_shifts.len(),
                "Payroll priced shifts without clock-out at their estimated end"
            );
        }

        let number = match &existing {
            Some(stored) => stored.payroll_number.clone(),
            None => {
                let seq = self.db.payrolls().next_sequence(&business.id, year_key, month_key).await?;
                payroll_number(&business.id, year, month, seq)
            }
        };
        let id = existing.as_ref().map(|p| p.id.clone()).unwrap_or_else(generate_id);

        let payroll = Payroll {
            id: id.clone(),
            business_id: business.id.clone(),
            employee_id: employee.id.clone(),
            payroll_number: number,
            period_start: calc.period_start,
            period_end: calc.period_end,
            year: year_key,
            month: month_key,
            base_salary: calc.base_salary.rupiah(),
            pro_rated_base_salary: calc.pro_rated_base_salary.rupiah(),
            expected_working_days: calc.expected_working_days,
            actual_working_days: calc.actual_working_days,
            present_days: calc.present_days,
            absent_days: calc.absent_days,
            late_count: calc.late_count,
            total_working_minutes: calc.total_working_minutes,
            overtime_minutes: calc.overtime_minutes,
            overtime_pay: calc.overtime_pay.rupiah(),
            commission: calc.commission.rupiah(),
            bonus: calc.bonus.rupiah(),
            allowance: calc.allowance.rupiah(),
            late_penalty: calc.late_penalty.rupiah(),
            absent_penalty: calc.absent_penalty.rupiah(),
            other_deductions: calc.other_deductions.rupiah(),
            gross_salary: calc.gross_salary.rupiah(),
            total_deductions: calc.total_deductions.rupiah(),
            net_salary: calc.net_salary.rupiah(),
            status: PayrollStatus::Calculated,
            paid_at: None,
            notes: options.notes.clone(),
            created_at: existing.as_ref().map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        };
        let items: Vec<PayrollItem> = calc
            .lines()
            .into_iter()
            .map(|line| PayrollItem {
                id: generate_id(),
                payroll_id: id.clone(),
                kind: line.kind,
                category: line.category.to_string(),
                description: line.description,
                amount: line.amount.rupiah(),
            })
            .collect();

        let saved = self.db.payrolls().save_calculation(&payroll, &items).await?;
        info!(
            payroll_number = %saved.payroll_number,
            employee_id = %employee.id,
            net_salary = saved.net_salary,
            "Payroll calculated"
        );

        let items = self.db.payrolls().items(&saved.id).await?;
        Ok(PayrollDetail {
            payroll: saved,
            items,
            calculation: Some(calc),
        })
    }

    /// Runs `generate` for every active employee. Failures are reported per
    /// employee instead of aborting the batch.
    pub async fn generate_all(
        &self,
        business: &Business,
        req: &GenerateAllRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<GenerateAllResult> {
        validate_month(req.month)?;
        req.options.validate()?;
        let employees = self.db.employees().list_by_business(&business.id, true).await?;

        let mut result = GenerateAllResult {
            generated: Vec::with_capacity(employees.len()),
            skipped: Vec::new(),
        };
        for employee in &employees {
            match self
                .generate_for(business, employee, req.year, req.month, &req.options, now)
                .await
            {
                Ok(detail) => result.generated.push(detail.payroll),
                Err(e) => result.skipped.push(SkippedEmployee {
                    employee_id: employee.id.clone(),
                    name: employee.name.clone(),
                    reason: e.message,
                }),
            }
        }

        info!(
            business_id = %business.id,
            generated = result.generated.len(),
            skipped = result.skipped.len(),
            "Payroll batch finished"
        );
        Ok(result)
    }

    pub async fn get(&self, business: &Business, id: &str) -> ApiResult<PayrollDetail> {
        let payroll = self.db.payrolls().get_for_business(&business.id, id).await?;
        let items = self.db.payrolls().items(&payroll.id).await?;
        Ok(PayrollDetail {
            payroll,
            items,
            calculation: None,
        })
    }

    pub async fn list(&self, business: &Business, year: i32, month: u32) -> ApiResult<Vec<Payroll>> {
        validate_month(month)?;
        Ok(self
            .db
            .payrolls()
            .list_by_business(&business.id, i64::from(year), i64::from(month))
            .await?)
    }

    pub async fn approve(&self, business: &Business, id: &str) -> ApiResult<Payroll> {
        let mut payroll = self.db.payrolls().get_for_business(&business.id, id).await?;
        let expected = payroll.status;
        payroll.approve()?;
        self.db.payrolls().update_status(&payroll, expected).await?;
        info!(payroll_number = %payroll.payroll_number, "Payroll approved");
        Ok(payroll)
    }

    pub async fn pay(&self, business: &Business, id: &str, now: DateTime<Utc>) -> ApiResult<Payroll> {
        let mut payroll = self.db.payrolls().get_for_business(&business.id, id).await?;
        let expected = payroll.status;
        payroll.mark_paid(now)?;
        self.db.payrolls().update_status(&payroll, expected).await?;
        info!(payroll_number = %payroll.payroll_number, net_salary = payroll.net_salary, "Payroll paid");
        Ok(payroll)
    }

    pub async fn cancel(&self, business: &Business, id: &str) -> ApiResult<Payroll> {
        let mut payroll = self.db.payrolls().get_for_business(&business.id, id).await?;
        let expected = payroll.status;
        payroll.cancel()?;
        self.db.payrolls().update_status(&payroll, expected).await?;
        info!(payroll_number = %payroll.payroll_number, "Payroll cancelled");
        Ok(payroll)
    }
}
