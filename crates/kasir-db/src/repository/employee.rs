//! # Employee Repository
//!
//! Employees and their attendance shifts. An employee with a `user_id` can
//! log in; the subscription gate resolves their business owner through
//! [`EmployeeRepository::find_by_user_id`].

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasir_core::{Employee, EmployeeShift};

const SELECT_EMPLOYEE: &str = r#"
    SELECT id, business_id, user_id, outlet_id, name, phone, role, salary,
           commission_rate_bps, is_active, created_at, updated_at
    FROM employees
"#;

#[derive(Debug, Clone)]
pub struct EmployeeRepository {
    pool: SqlitePool,
}

impl EmployeeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        EmployeeRepository { pool }
    }

    pub async fn insert(&self, employee: &Employee) -> DbResult<()> {
        debug!(business_id = %employee.business_id, role = employee.role.as_str(), "Inserting employee");

        sqlx::query(
            r#"
            INSERT INTO employees (
                id, business_id, user_id, outlet_id, name, phone, role, salary,
                commission_rate_bps, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&employee.id)
        .bind(&employee.business_id)
        .bind(&employee.user_id)
        .bind(&employee.outlet_id)
        .bind(&employee.name)
        .bind(&employee.phone)
        .bind(employee.role)
        .bind(employee.salary)
        .bind(employee.commission_rate_bps)
        .bind(employee.is_active)
        .bind(employee.created_at)
        .bind(employee.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_for_business(&self, business_id: &str, id: &str) -> DbResult<Employee> {
        sqlx::query_as::<_, Employee>(&format!(
            "{SELECT_EMPLOYEE} WHERE id = ?1 AND business_id = ?2"
        ))
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Employee", id))
    }

    pub async fn list_by_business(&self, business_id: &str, active_only: bool) -> DbResult<Vec<Employee>> {
        let employees = sqlx::query_as::<_, Employee>(&format!(
            "{SELECT_EMPLOYEE} WHERE business_id = ?1 AND (?2 = 0 OR is_active = 1) ORDER BY name"
        ))
        .bind(business_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(employees)
    }

    /// Active employees; the plan's employee limit counts these.
    pub async fn count_by_business(&self, business_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM employees WHERE business_id = ?1 AND is_active = 1",
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// The employee record linked to a login account.
    pub async fn find_by_user_id(&self, user_id: &str) -> DbResult<Option<Employee>> {
        let employee = sqlx::query_as::<_, Employee>(&format!(
            "{SELECT_EMPLOYEE} WHERE user_id = ?1 AND is_active = 1 ORDER BY created_at LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(employee)
    }

    // -------------------------------------------------------------------------
    // Attendance shifts
    // -------------------------------------------------------------------------

    pub async fn insert_shift(&self, shift: &EmployeeShift) -> DbResult<()> {
        debug!(employee_id = %shift.employee_id, date = %shift.shift_date, "Recording shift");

        sqlx::query(
            r#"
            INSERT INTO employee_shifts (
                id, employee_id, outlet_id, shift_date, start_time, end_time,
                clock_in, clock_out, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&shift.id)
        .bind(&shift.employee_id)
        .bind(&shift.outlet_id)
        .bind(shift.shift_date)
        .bind(shift.start_time)
        .bind(shift.end_time)
        .bind(shift.clock_in)
        .bind(shift.clock_out)
        .bind(shift.status)
        .bind(shift.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Shifts with `start <= shift_date <= end`, oldest first.
    pub async fn shifts_in_period(
        &self,
        employee_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<Vec<EmployeeShift>> {
        let shifts = sqlx::query_as::<_, EmployeeShift>(
            r#"
            SELECT id, employee_id, outlet_id, shift_date, start_time, end_time,
                   clock_in, clock_out, status, created_at
            FROM employee_shifts
            WHERE employee_id = ?1 AND shift_date >= ?2 AND shift_date <= ?3
            ORDER BY shift_date ASC, start_time ASC
            "#,
        )
        .bind(employee_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(shifts)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repository::test_support;
    use crate::{generate_id, Database};
    use chrono::{NaiveTime, Utc};
    use kasir_core::{AttendanceStatus, Role};

    pub(crate) async fn employee(db: &Database, business_id: &str, user_id: Option<&str>) -> Employee {
        let now = Utc::now();
        let employee = Employee {
            id: generate_id(),
            business_id: business_id.to_string(),
            user_id: user_id.map(str::to_string),
            outlet_id: None,
            name: "Budi".to_string(),
            phone: None,
            role: Role::Kasir,
            salary: 4_400_000,
            commission_rate_bps: 100,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.employees().insert(&employee).await.unwrap();
        employee
    }

    fn shift(employee_id: &str, day: u32) -> EmployeeShift {
        EmployeeShift {
            id: generate_id(),
            employee_id: employee_id.to_string(),
            outlet_id: None,
            shift_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            start_time: NaiveTime::from_hms_opt(8, 0, 0),
            end_time: NaiveTime::from_hms_opt(16, 0, 0),
            clock_in: NaiveTime::from_hms_opt(8, 5, 0),
            clock_out: NaiveTime::from_hms_opt(16, 0, 0),
            status: AttendanceStatus::Late,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_find_by_user_id() {
        let db = test_support::db().await;
        let (_, business, _) = test_support::tenant(&db).await;
        let cashier = test_support::user(&db, "kasir@kopi.id", Role::Kasir).await;
        let e = employee(&db, &business.id, Some(&cashier.id)).await;

        let found = db.employees().find_by_user_id(&cashier.id).await.unwrap().unwrap();
        assert_eq!(found.id, e.id);
        assert_eq!(found.business_id, business.id);
        assert_eq!(db.employees().count_by_business(&business.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shifts_in_period() {
        let db = test_support::db().await;
        let (_, business, _) = test_support::tenant(&db).await;
        let e = employee(&db, &business.id, None).await;

        for day in [3, 4, 31] {
            db.employees().insert_shift(&shift(&e.id, day)).await.unwrap();
        }

        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let shifts = db.employees().shifts_in_period(&e.id, start, end).await.unwrap();
        assert_eq!(shifts.len(), 2);
        assert_eq!(shifts[0].status, AttendanceStatus::Late);
        assert_eq!(shifts[0].clock_in, NaiveTime::from_hms_opt(8, 5, 0));
    }
}
