//! # Payroll
//!
//! Monthly salary calculation from attendance shifts and sales commission.
//!
//! ## Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  expected  = weekdays in month matching the outlet's working days       │
//! │  present   = shifts completed or late          absent = expected - present│
//! │                                                                         │
//! │  base'     = base × present / expected   (only when present < expected) │
//! │  overtime  = Σ max(0, shift minutes - 480) × hourly_rate / 60           │
//! │              hourly_rate = base / (expected × 8) × 1.5                  │
//! │  commission= Σ eligible order totals × rate                             │
//! │                                                                         │
//! │  gross      = base' + overtime + commission + bonus + allowance         │
//! │  deductions = late × 50.000 + absent × base / expected + other          │
//! │  net        = max(0, gross - deductions)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Work time is counted in whole minutes; money rounds once per component.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{AttendanceStatus, Employee, EmployeeShift};
use crate::validation::{validate_price, ValidationResult};
use crate::{DEFAULT_LATE_PENALTY, STANDARD_SHIFT_MINUTES};

/// Absent penalty when no daily salary can be derived.
pub const FALLBACK_ABSENT_PENALTY: i64 = 50_000;

/// Hourly overtime rate when no salary can be derived.
pub const FALLBACK_OVERTIME_RATE: i64 = 10_000;

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PayrollStatus {
    Draft,
    Calculated,
    Approved,
    Paid,
    Cancelled,
}

impl PayrollStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PayrollStatus::Draft => "draft",
            PayrollStatus::Calculated => "calculated",
            PayrollStatus::Approved => "approved",
            PayrollStatus::Paid => "paid",
            PayrollStatus::Cancelled => "cancelled",
        }
    }

    /// Approved and paid payrolls are frozen.
    pub const fn can_recalculate(&self) -> bool {
        matches!(
            self,
            PayrollStatus::Draft | PayrollStatus::Calculated | PayrollStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PayrollItemKind {
    Earning,
    Deduction,
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payroll {
    pub id: String,
    pub business_id: String,
    pub employee_id: String,
    pub payroll_number: String,
    #[ts(as = "String")]
    pub period_start: NaiveDate,
    #[ts(as = "String")]
    pub period_end: NaiveDate,
    pub year: i64,
    pub month: i64,
    pub base_salary: i64,
    pub pro_rated_base_salary: i64,
    pub expected_working_days: i64,
    pub actual_working_days: i64,
    pub present_days: i64,
    pub absent_days: i64,
    pub late_count: i64,
    pub total_working_minutes: i64,
    pub overtime_minutes: i64,
    pub overtime_pay: i64,
    pub commission: i64,
    pub bonus: i64,
    pub allowance: i64,
    pub late_penalty: i64,
    pub absent_penalty: i64,
    pub other_deductions: i64,
    pub gross_salary: i64,
    pub total_deductions: i64,
    pub net_salary: i64,
    pub status: PayrollStatus,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PayrollItem {
    pub id: String,
    pub payroll_id: String,
    pub kind: PayrollItemKind,
    pub category: String,
    pub description: String,
    pub amount: i64,
}

impl Payroll {
    fn invalid(&self, action: &str) -> CoreError {
        CoreError::InvalidPayrollStatus {
            payroll_number: self.payroll_number.clone(),
            current_status: self.status.as_str().to_string(),
            action: action.to_string(),
        }
    }

    pub fn approve(&mut self) -> CoreResult<()> {
        if self.status != PayrollStatus::Calculated {
            return Err(self.invalid("approve"));
        }
        self.status = PayrollStatus::Approved;
        Ok(())
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != PayrollStatus::Approved {
            return Err(self.invalid("pay"));
        }
        self.status = PayrollStatus::Paid;
        self.paid_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self) -> CoreResult<()> {
        if matches!(self.status, PayrollStatus::Paid | PayrollStatus::Cancelled) {
            return Err(self.invalid("cancel"));
        }
        self.status = PayrollStatus::Cancelled;
        Ok(())
    }
}

/// `PR-{business}-{year}-{month:02}-{seq:04}` where `{business}` is the
/// first 8 characters of the business id, uppercased.
pub fn payroll_number(business_id: &str, year: i32, month: u32, seq: i64) -> String {
    let prefix: String = business_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("PR-{}-{}-{:02}-{:04}", prefix, year, month, seq)
}

// =============================================================================
// Calculation
// =============================================================================

/// Overrides supplied when generating a payroll.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
pub struct PayrollOptions {
    #[serde(default)]
    pub bonus: i64,
    #[serde(default)]
    pub allowance: i64,
    #[serde(default)]
    pub other_deductions: i64,
    pub late_penalty_per_occurrence: Option<i64>,
    pub absent_penalty_per_day: Option<i64>,
    /// Hourly overtime rate.
    pub overtime_rate: Option<i64>,
    pub notes: Option<String>,
}

impl PayrollOptions {
    /// Every override is a non-negative amount no larger than `MAX_AMOUNT`.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_price("bonus", self.bonus)?;
        validate_price("allowance", self.allowance)?;
        validate_price("other_deductions", self.other_deductions)?;
        let optional = [
            ("late_penalty_per_occurrence", self.late_penalty_per_occurrence),
            ("absent_penalty_per_day", self.absent_penalty_per_day),
            ("overtime_rate", self.overtime_rate),
        ];
        for (field, value) in optional {
            if let Some(v) = value {
                validate_price(field, v)?;
            }
        }
        Ok(())
    }
}

/// A shift without clock-out, priced at its estimated end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct IncompleteShift {
    pub shift_id: String,
    #[ts(as = "String")]
    pub shift_date: NaiveDate,
    #[ts(as = "String")]
    pub estimated_clock_out: NaiveDateTime,
    pub estimated_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct PayrollCalculation {
    #[ts(as = "String")]
    pub period_start: NaiveDate,
    #[ts(as = "String")]
    pub period_end: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub base_salary: Money,
    pub pro_rated_base_salary: Money,
    pub expected_working_days: i64,
    pub actual_working_days: i64,
    pub present_days: i64,
    pub absent_days: i64,
    pub late_count: i64,
    pub total_working_minutes: i64,
    pub overtime_minutes: i64,
    pub incomplete_shifts: Vec<IncompleteShift>,
    pub late_penalty_per_occurrence: Money,
    pub late_penalty: Money,
    pub absent_penalty_per_day: Money,
    pub absent_penalty: Money,
    pub overtime_rate: Money,
    pub overtime_pay: Money,
    pub commission_rate_bps: i64,
    pub commission: Money,
    pub bonus: Money,
    pub allowance: Money,
    pub other_deductions: Money,
    pub gross_salary: Money,
    pub total_deductions: Money,
    pub net_salary: Money,
}

/// A line of the payslip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayrollLine {
    pub kind: PayrollItemKind,
    pub category: &'static str,
    pub description: String,
    pub amount: Money,
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> CoreResult<(NaiveDate, NaiveDate)> {
    let out_of_range = || {
        CoreError::Validation(ValidationError::OutOfRange {
            field: "month".to_string(),
            min: 1,
            max: 12,
        })
    };
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(out_of_range)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(out_of_range)?;
    Ok((start, next - Duration::days(1)))
}

/// Days in `[start, end]` whose weekday (0 = Sunday) is in `working_days`.
pub fn expected_working_days(start: NaiveDate, end: NaiveDate, working_days: &[u32]) -> i64 {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| working_days.contains(&d.weekday().num_days_from_sunday()))
        .count() as i64
}

/// Worked minutes of one shift, or `None` without a clock-in.
///
/// Clock-out earlier than clock-in means the shift crossed midnight. A
/// missing clock-out is estimated from the scheduled end, else 8 hours.
fn shift_minutes(shift: &EmployeeShift) -> Option<(i64, Option<NaiveDateTime>)> {
    let clock_in = shift.shift_date.and_time(shift.clock_in?);
    let wrap = |t: NaiveDateTime| if t < clock_in { t + Duration::days(1) } else { t };

    match shift.clock_out {
        Some(out) => {
            let out = wrap(shift.shift_date.and_time(out));
            Some(((out - clock_in).num_minutes(), None))
        }
        None => {
            let estimated = match shift.end_time {
                Some(end) => wrap(shift.shift_date.and_time(end)),
                None => clock_in + Duration::minutes(STANDARD_SHIFT_MINUTES),
            };
            Some(((estimated - clock_in).num_minutes(), Some(estimated)))
        }
    }
}

/// Everything needed to price one employee-month.
pub struct PayrollInput<'a> {
    pub employee: &'a Employee,
    pub year: i32,
    pub month: u32,
    pub working_days: &'a [u32],
    pub shifts: &'a [EmployeeShift],
    /// Σ totals of the employee's paid, commission-eligible orders in the period.
    pub commission_sales: Money,
    pub options: &'a PayrollOptions,
}

/// Prices an employee's month.
pub fn calculate(input: &PayrollInput<'_>) -> CoreResult<PayrollCalculation> {
    input.options.validate()?;
    let (period_start, period_end) = month_bounds(input.year, input.month)?;
    let shifts: Vec<&EmployeeShift> = input
        .shifts
        .iter()
        .filter(|s| s.shift_date >= period_start && s.shift_date <= period_end)
        .collect();

    let expected = expected_working_days(period_start, period_end, input.working_days);
    let present = shifts.iter().filter(|s| s.status.is_present()).count() as i64;
    let late_count = shifts
        .iter()
        .filter(|s| s.status == AttendanceStatus::Late)
        .count() as i64;
    let absent = (expected - present).max(0);

    let mut total_minutes = 0;
    let mut overtime_minutes = 0;
    let mut incomplete_shifts = Vec::new();
    for shift in &shifts {
        let Some((minutes, estimated)) = shift_minutes(shift) else {
            continue;
        };
        total_minutes += minutes;
        overtime_minutes += (minutes - STANDARD_SHIFT_MINUTES).max(0);
        if let Some(estimated_clock_out) = estimated {
            incomplete_shifts.push(IncompleteShift {
                shift_id: shift.id.clone(),
                shift_date: shift.shift_date,
                estimated_clock_out,
                estimated_minutes: minutes,
            });
        }
    }

    let base = Money::from_rupiah(input.employee.salary);
    let derivable = base.is_positive() && expected > 0;
    let opts = input.options;

    let late_per = Money::from_rupiah(opts.late_penalty_per_occurrence.unwrap_or(DEFAULT_LATE_PENALTY));
    let absent_per = match opts.absent_penalty_per_day {
        Some(v) => Money::from_rupiah(v),
        None if derivable => base.divide_round(expected),
        None => Money::from_rupiah(FALLBACK_ABSENT_PENALTY),
    };
    let overtime_rate = match opts.overtime_rate {
        Some(v) => Money::from_rupiah(v),
        // base / (expected × 8) × 1.5
        None if derivable => base.scale(3, expected * 16),
        None => Money::from_rupiah(FALLBACK_OVERTIME_RATE),
    };

    let pro_rated = if expected > 0 && present < expected {
        base.scale(present, expected)
    } else {
        base
    };

    let late_penalty = late_per * late_count;
    let absent_penalty = absent_per * absent;
    let overtime_pay = overtime_rate.scale(overtime_minutes, 60);
    let commission_rate_bps = input.employee.commission_rate_bps.max(0);
    let commission = input
        .commission_sales
        .percentage_bps(u32::try_from(commission_rate_bps).unwrap_or(u32::MAX));
    let bonus = Money::from_rupiah(opts.bonus);
    let allowance = Money::from_rupiah(opts.allowance);
    let other = Money::from_rupiah(opts.other_deductions);

    let gross = pro_rated + overtime_pay + commission + bonus + allowance;
    let deductions = late_penalty + absent_penalty + other;

    Ok(PayrollCalculation {
        period_start,
        period_end,
        year: input.year,
        month: input.month,
        base_salary: base,
        pro_rated_base_salary: pro_rated,
        expected_working_days: expected,
        actual_working_days: shifts.len() as i64,
        present_days: present,
        absent_days: absent,
        late_count,
        total_working_minutes: total_minutes,
        overtime_minutes,
        incomplete_shifts,
        late_penalty_per_occurrence: late_per,
        late_penalty,
        absent_penalty_per_day: absent_per,
        absent_penalty,
        overtime_rate,
        overtime_pay,
        commission_rate_bps,
        commission,
        bonus,
        allowance,
        other_deductions: other,
        gross_salary: gross,
        total_deductions: deductions,
        net_salary: (gross - deductions).non_negative(),
    })
}

impl PayrollCalculation {
    /// Payslip lines. Zero amounts are omitted except the base salary.
    pub fn lines(&self) -> Vec<PayrollLine> {
        use PayrollItemKind::{Deduction, Earning};

        let hours = self.overtime_minutes as f64 / 60.0;
        let candidates = [
            (Earning, "base_salary", "Gaji Pokok".to_string(), self.pro_rated_base_salary, true),
            (Earning, "overtime", format!("Lembur ({:.2} jam)", hours), self.overtime_pay, false),
            (
                Earning,
                "commission",
                format!("Komisi ({:.2}%)", self.commission_rate_bps as f64 / 100.0),
                self.commission,
                false,
            ),
            (Earning, "bonus", "Bonus".to_string(), self.bonus, false),
            (Earning, "allowance", "Tunjangan".to_string(), self.allowance, false),
            (
                Deduction,
                "late_penalty",
                format!("Denda Terlambat ({}x)", self.late_count),
                self.late_penalty,
                false,
            ),
            (
                Deduction,
                "absent_penalty",
                format!("Denda Tidak Hadir ({} hari)", self.absent_days),
                self.absent_penalty,
                false,
            ),
            (Deduction, "other", "Potongan Lainnya".to_string(), self.other_deductions, false),
        ];

        candidates
            .into_iter()
            .filter(|(_, _, _, amount, always)| *always || amount.is_positive())
            .map(|(kind, category, description, amount, _)| PayrollLine {
                kind,
                category,
                description,
                amount,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use chrono::NaiveTime;

    fn employee(salary: i64, commission_rate_bps: i64) -> Employee {
        Employee {
            id: "e-1".to_string(),
            business_id: "b-1".to_string(),
            user_id: None,
            outlet_id: None,
            name: "Budi".to_string(),
            phone: None,
            role: Role::Kasir,
            salary,
            commission_rate_bps,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn shift(
        day: u32,
        status: AttendanceStatus,
        clock_in: Option<NaiveTime>,
        clock_out: Option<NaiveTime>,
    ) -> EmployeeShift {
        EmployeeShift {
            id: format!("s-{}", day),
            employee_id: "e-1".to_string(),
            outlet_id: None,
            shift_date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            start_time: Some(t(8, 0)),
            end_time: None,
            clock_in,
            clock_out,
            status,
            created_at: Utc::now(),
        }
    }

    fn calc(emp: &Employee, shifts: &[EmployeeShift], sales: i64, opts: &PayrollOptions) -> PayrollCalculation {
        calculate(&PayrollInput {
            employee: emp,
            year: 2025,
            month: 1,
            working_days: &[1, 2, 3, 4, 5],
            shifts,
            commission_sales: Money::from_rupiah(sales),
            options: opts,
        })
        .unwrap()
    }

    #[test]
    fn test_month_bounds() {
        let (start, end) = month_bounds(2024, 2).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let (_, dec_end) = month_bounds(2025, 12).unwrap();
        assert_eq!(dec_end, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(month_bounds(2025, 13).is_err());
    }

    #[test]
    fn test_expected_working_days_january_2025() {
        // Jan 2025 starts on Wednesday: 23 weekdays
        let (start, end) = month_bounds(2025, 1).unwrap();
        assert_eq!(expected_working_days(start, end, &[1, 2, 3, 4, 5]), 23);
        assert_eq!(expected_working_days(start, end, &[0]), 4);
    }

    #[test]
    fn test_full_attendance_no_proration() {
        let emp = employee(2_300_000, 0);
        let (start, end) = month_bounds(2025, 1).unwrap();
        let shifts: Vec<EmployeeShift> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| (1..=5).contains(&d.weekday().num_days_from_sunday()))
            .map(|d| shift(d.day(), AttendanceStatus::Completed, Some(t(8, 0)), Some(t(16, 0))))
            .collect();

        let c = calc(&emp, &shifts, 0, &PayrollOptions::default());
        assert_eq!(c.present_days, 23);
        assert_eq!(c.absent_days, 0);
        assert_eq!(c.pro_rated_base_salary.rupiah(), 2_300_000);
        assert_eq!(c.overtime_minutes, 0);
        assert_eq!(c.net_salary.rupiah(), 2_300_000);
    }

    #[test]
    fn test_proration_and_penalties() {
        let emp = employee(2_300_000, 0);
        let shifts = vec![
            shift(2, AttendanceStatus::Completed, Some(t(8, 0)), Some(t(16, 0))),
            shift(3, AttendanceStatus::Late, Some(t(8, 30)), Some(t(16, 0))),
        ];
        let c = calc(&emp, &shifts, 0, &PayrollOptions::default());

        assert_eq!(c.present_days, 2);
        assert_eq!(c.absent_days, 21);
        assert_eq!(c.late_count, 1);
        assert_eq!(c.pro_rated_base_salary.rupiah(), 200_000);
        assert_eq!(c.absent_penalty_per_day.rupiah(), 100_000);
        assert_eq!(c.late_penalty.rupiah(), 50_000);
        // Deductions exceed gross: net floors at zero
        assert_eq!(c.net_salary, Money::zero());
    }

    #[test]
    fn test_overtime_with_overnight_shift() {
        let emp = employee(2_300_000, 0);
        // 20:00 → 06:30 next day = 10h30m, 150 minutes overtime
        let shifts = vec![shift(6, AttendanceStatus::Completed, Some(t(20, 0)), Some(t(6, 30)))];
        let c = calc(&emp, &shifts, 0, &PayrollOptions::default());

        assert_eq!(c.total_working_minutes, 630);
        assert_eq!(c.overtime_minutes, 150);
        // rate = 2.300.000 × 3 / (23 × 16) = 18.750/hour; 2.5h = 46.875
        assert_eq!(c.overtime_rate.rupiah(), 18_750);
        assert_eq!(c.overtime_pay.rupiah(), 46_875);
    }

    #[test]
    fn test_missing_clock_out_is_estimated() {
        let emp = employee(0, 0);
        let mut with_end = shift(7, AttendanceStatus::Completed, Some(t(9, 0)), None);
        with_end.end_time = Some(t(19, 0));
        let without_end = shift(8, AttendanceStatus::Completed, Some(t(9, 0)), None);

        let c = calc(&emp, &[with_end, without_end], 0, &PayrollOptions::default());
        assert_eq!(c.incomplete_shifts.len(), 2);
        assert_eq!(c.incomplete_shifts[0].estimated_minutes, 600);
        assert_eq!(c.incomplete_shifts[1].estimated_minutes, 480);
        assert_eq!(c.overtime_minutes, 120);
        // Zero salary falls back to the flat rate
        assert_eq!(c.overtime_rate.rupiah(), FALLBACK_OVERTIME_RATE);
        assert_eq!(c.absent_penalty_per_day.rupiah(), FALLBACK_ABSENT_PENALTY);
    }

    #[test]
    fn test_commission_and_extras() {
        let emp = employee(0, 250);
        let opts = PayrollOptions {
            bonus: 100_000,
            allowance: 50_000,
            other_deductions: 20_000,
            absent_penalty_per_day: Some(0),
            ..PayrollOptions::default()
        };
        let c = calc(&emp, &[], 4_000_000, &opts);
        assert_eq!(c.commission.rupiah(), 100_000);
        assert_eq!(c.gross_salary.rupiah(), 250_000);
        assert_eq!(c.total_deductions.rupiah(), 20_000);
        assert_eq!(c.net_salary.rupiah(), 230_000);

        let lines = c.lines();
        let categories: Vec<&str> = lines.iter().map(|l| l.category).collect();
        assert_eq!(categories, vec!["base_salary", "commission", "bonus", "allowance", "other"]);
        assert_eq!(lines[1].description, "Komisi (2.50%)");
    }

    #[test]
    fn test_options_out_of_range_rejected() {
        let emp = employee(3_000_000, 0);
        let negative = PayrollOptions {
            other_deductions: -500_000,
            ..PayrollOptions::default()
        };
        let huge = PayrollOptions {
            late_penalty_per_occurrence: Some(i64::MAX),
            ..PayrollOptions::default()
        };
        for opts in [&negative, &huge] {
            let err = calculate(&PayrollInput {
                employee: &emp,
                year: 2025,
                month: 1,
                working_days: &[1, 2, 3, 4, 5],
                shifts: &[],
                commission_sales: Money::zero(),
                options: opts,
            })
            .unwrap_err();
            assert!(matches!(err, CoreError::Validation(ValidationError::OutOfRange { .. })));
        }
    }

    #[test]
    fn test_shifts_outside_period_ignored() {
        let emp = employee(2_300_000, 0);
        let mut feb = shift(3, AttendanceStatus::Completed, Some(t(8, 0)), Some(t(20, 0)));
        feb.shift_date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let c = calc(&emp, &[feb], 0, &PayrollOptions::default());
        assert_eq!(c.actual_working_days, 0);
        assert_eq!(c.overtime_minutes, 0);
    }

    #[test]
    fn test_status_transitions() {
        let mut p = Payroll {
            id: "p-1".to_string(),
            business_id: "b-1".to_string(),
            employee_id: "e-1".to_string(),
            payroll_number: payroll_number("b-1", 2025, 1, 1),
            period_start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            year: 2025,
            month: 1,
            base_salary: 0,
            pro_rated_base_salary: 0,
            expected_working_days: 23,
            actual_working_days: 0,
            present_days: 0,
            absent_days: 23,
            late_count: 0,
            total_working_minutes: 0,
            overtime_minutes: 0,
            overtime_pay: 0,
            commission: 0,
            bonus: 0,
            allowance: 0,
            late_penalty: 0,
            absent_penalty: 0,
            other_deductions: 0,
            gross_salary: 0,
            total_deductions: 0,
            net_salary: 0,
            status: PayrollStatus::Calculated,
            paid_at: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(p.mark_paid(Utc::now()).is_err());
        p.approve().unwrap();
        assert!(!p.status.can_recalculate());
        p.mark_paid(Utc::now()).unwrap();
        assert!(p.paid_at.is_some());
        assert!(p.cancel().is_err());
    }

    #[test]
    fn test_payroll_number() {
        assert_eq!(
            payroll_number("3f2a9c1e-77aa-4d1b", 2025, 3, 7),
            "PR-3F2A9C1E-2025-03-0007"
        );
    }
}
