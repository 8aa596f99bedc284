//! # Payroll Repository
//!
//! Monthly payrolls and their payslip items. A payroll is unique per
//! employee and month; regenerating overwrites the figures and replaces
//! the items unless the stored payroll is already approved or paid.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use kasir_core::payroll::{Payroll, PayrollItem, PayrollStatus};

const SELECT_PAYROLL: &str = r#"
    SELECT id, business_id, employee_id, payroll_number, period_start, period_end,
           year, month, base_salary, pro_rated_base_salary, expected_working_days,
           actual_working_days, present_days, absent_days, late_count,
           total_working_minutes, overtime_minutes, overtime_pay, commission, bonus,
           allowance, late_penalty, absent_penalty, other_deductions, gross_salary,
           total_deductions, net_salary, status, paid_at, notes, created_at, updated_at
    FROM payrolls
"#;

#[derive(Debug, Clone)]
pub struct PayrollRepository {
    pool: SqlitePool,
}

impl PayrollRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PayrollRepository { pool }
    }

    pub async fn find(&self, employee_id: &str, year: i64, month: i64) -> DbResult<Option<Payroll>> {
        let payroll = sqlx::query_as::<_, Payroll>(&format!(
            "{SELECT_PAYROLL} WHERE employee_id = ?1 AND year = ?2 AND month = ?3"
        ))
        .bind(employee_id)
        .bind(year)
        .bind(month)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payroll)
    }

    /// Next sequence number for payroll numbers of a business-month.
    pub async fn next_sequence(&self, business_id: &str, year: i64, month: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payrolls WHERE business_id = ?1 AND year = ?2 AND month = ?3",
        )
        .bind(business_id)
        .bind(year)
        .bind(month)
        .fetch_one(&self.pool)
        .await?;
        Ok(count + 1)
    }

    /// Inserts or recalculates the employee-month payroll and replaces its
    /// items. An existing payroll keeps its id and number.
    ///
    /// ## Returns
    /// * `Err(DbError::Conflict)` - stored payroll is approved or paid
    pub async fn save_calculation(&self, payroll: &Payroll, items: &[PayrollItem]) -> DbResult<Payroll> {
        debug!(
            employee_id = %payroll.employee_id,
            year = payroll.year,
            month = payroll.month,
            "Saving payroll"
        );

        let mut tx = self.pool.begin().await?;

        let stored_id: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO payrolls (
                id, business_id, employee_id, payroll_number, period_start, period_end,
                year, month, base_salary, pro_rated_base_salary, expected_working_days,
                actual_working_days, present_days, absent_days, late_count,
                total_working_minutes, overtime_minutes, overtime_pay, commission, bonus,
                allowance, late_penalty, absent_penalty, other_deductions, gross_salary,
                total_deductions, net_salary, status, paid_at, notes, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32
            )
            ON CONFLICT (employee_id, year, month) DO UPDATE SET
                base_salary = excluded.base_salary,
                pro_rated_base_salary = excluded.pro_rated_base_salary,
                expected_working_days = excluded.expected_working_days,
                actual_working_days = excluded.actual_working_days,
                present_days = excluded.present_days,
                absent_days = excluded.absent_days,
                late_count = excluded.late_count,
                total_working_minutes = excluded.total_working_minutes,
                overtime_minutes = excluded.overtime_minutes,
                overtime_pay = excluded.overtime_pay,
                commission = excluded.commission,
                bonus = excluded.bonus,
                allowance = excluded.allowance,
                late_penalty = excluded.late_penalty,
                absent_penalty = excluded.absent_penalty,
                other_deductions = excluded.other_deductions,
                gross_salary = excluded.gross_salary,
                total_deductions = excluded.total_deductions,
                net_salary = excluded.net_salary,
                status = excluded.status,
                notes = excluded.notes,
                updated_at = excluded.updated_at
            WHERE payrolls.status NOT IN ('approved', 'paid')
            RETURNING id
            "#,
        )
        .bind(&payroll.id)
        .bind(&payroll.business_id)
        .bind(&payroll.employee_id)
        .bind(&payroll.payroll_number)
        .bind(payroll.period_start)
        .bind(payroll.period_end)
        .bind(payroll.year)
        .bind(payroll.month)
        .bind(payroll.base_salary)
        .bind(payroll.pro_rated_base_salary)
        .bind(payroll.expected_working_days)
        .bind(payroll.actual_working_days)
        .bind(payroll.present_days)
        .bind(payroll.absent_days)
        .bind(payroll.late_count)
        .bind(payroll.total_working_minutes)
        .bind(payroll.overtime_minutes)
        .bind(payroll.overtime_pay)
        .bind(payroll.commission)
        .bind(payroll.bonus)
        .bind(payroll.allowance)
        .bind(payroll.late_penalty)
        .bind(payroll.absent_penalty)
        .bind(payroll.other_deductions)
        .bind(payroll.gross_salary)
        .bind(payroll.total_deductions)
        .bind(payroll.net_salary)
        .bind(payroll.status)
        .bind(payroll.paid_at)
        .bind(&payroll.notes)
        .bind(payroll.created_at)
        .bind(payroll.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        let stored_id = stored_id.ok_or_else(|| {
            DbError::conflict("Payroll", &payroll.payroll_number, "payroll is approved or paid")
        })?;

        sqlx::query("DELETE FROM payroll_items WHERE payroll_id = ?1")
            .bind(&stored_id)
            .execute(&mut *tx)
            .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO payroll_items (id, payroll_id, kind, category, description, amount)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&item.id)
            .bind(&stored_id)
            .bind(item.kind)
            .bind(&item.category)
            .bind(&item.description)
            .bind(item.amount)
            .execute(&mut *tx)
            .await?;
        }

        let saved = sqlx::query_as::<_, Payroll>(&format!("{SELECT_PAYROLL} WHERE id = ?1"))
            .bind(&stored_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(payroll_number = %saved.payroll_number, net_salary = saved.net_salary, "Payroll saved");
        Ok(saved)
    }

    pub async fn get_for_business(&self, business_id: &str, id: &str) -> DbResult<Payroll> {
        sqlx::query_as::<_, Payroll>(&format!("{SELECT_PAYROLL} WHERE id = ?1 AND business_id = ?2"))
            .bind(id)
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Payroll", id))
    }

    /// Writes a status change made by `Payroll::approve/mark_paid/cancel`,
    /// provided the stored status is still `expected`.
    pub async fn update_status(&self, payroll: &Payroll, expected: PayrollStatus) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payrolls SET status = ?2, paid_at = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?5
            "#,
        )
        .bind(&payroll.id)
        .bind(payroll.status)
        .bind(payroll.paid_at)
        .bind(Utc::now())
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict(
                "Payroll",
                &payroll.payroll_number,
                format!("expected status {}", expected.as_str()),
            ));
        }
        Ok(())
    }

    pub async fn list_by_business(&self, business_id: &str, year: i64, month: i64) -> DbResult<Vec<Payroll>> {
        let payrolls = sqlx::query_as::<_, Payroll>(&format!(
            "{SELECT_PAYROLL} WHERE business_id = ?1 AND year = ?2 AND month = ?3 ORDER BY payroll_number"
        ))
        .bind(business_id)
        .bind(year)
        .bind(month)
        .fetch_all(&self.pool)
        .await?;
        Ok(payrolls)
    }

    pub async fn items(&self, payroll_id: &str) -> DbResult<Vec<PayrollItem>> {
        let items = sqlx::query_as::<_, PayrollItem>(
            r#"
            SELECT id, payroll_id, kind, category, description, amount
            FROM payroll_items WHERE payroll_id = ?1 ORDER BY rowid
            "#,
        )
        .bind(payroll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}
