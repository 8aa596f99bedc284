use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveTime, Utc};
use kasir_core::features::LimitResource;
use kasir_core::validation::{validate_bps, validate_name, validate_phone, validate_price};
use kasir_core::{AttendanceStatus, Employee, EmployeeShift, Role};
use kasir_db::generate_id;
use serde::Deserialize;
use tracing::info;

use super::{created, ok};
use crate::auth::Tenant;
use crate::error::{ApiError, ApiResult};
use crate::services::LimitsService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_employee))
        .route("/:id/shifts", post(record_shift))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Debug, Deserialize)]
struct CreateEmployeeRequest {
    name: String,
    role: Role,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    outlet_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    salary: i64,
    #[serde(default)]
    commission_rate_bps: i64,
}

#[derive(Debug, Deserialize)]
struct ShiftRequest {
    shift_date: NaiveDate,
    #[serde(default)]
    outlet_id: Option<String>,
    #[serde(default)]
    start_time: Option<NaiveTime>,
    #[serde(default)]
    end_time: Option<NaiveTime>,
    #[serde(default)]
    clock_in: Option<NaiveTime>,
    #[serde(default)]
    clock_out: Option<NaiveTime>,
    status: AttendanceStatus,
}

async fn list(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Query(q): Query<ListQuery>,
) -> ApiResult<Response> {
    let employees = state
        .db
        .employees()
        .list_by_business(&tenant.business.id, !q.include_inactive)
        .await?;
    Ok(ok(employees))
}

async fn get_employee(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    Ok(ok(state.db.employees().get_for_business(&tenant.business.id, &id).await?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(req): Json<CreateEmployeeRequest>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    validate_name("name", &req.name)?;
    validate_price("salary", req.salary)?;
    validate_bps("commission_rate_bps", req.commission_rate_bps)?;
    if !req.role.is_employee() {
        return Err(ApiError::validation("role must be admin, kasir, kitchen or waiter"));
    }
    if let Some(phone) = req.phone.as_deref() {
        validate_phone(phone)?;
    }

    let business_id = &tenant.business.id;
    if let Some(outlet_id) = &req.outlet_id {
        state.db.outlets().get_for_business(business_id, outlet_id).await?;
    }
    if let Some(user_id) = &req.user_id {
        state.db.users().require(user_id).await?;
    }

    let now = Utc::now();
    LimitsService::new(state.db.clone())
        .ensure_can_create(&tenant.business, LimitResource::Employees, now)
        .await?;

    let employee = Employee {
        id: generate_id(),
        business_id: business_id.clone(),
        user_id: req.user_id,
        outlet_id: req.outlet_id,
        name: req.name.trim().to_string(),
        phone: req.phone,
        role: req.role,
        salary: req.salary,
        commission_rate_bps: req.commission_rate_bps,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.db.employees().insert(&employee).await?;
    info!(employee_id = %employee.id, role = employee.role.as_str(), "Employee created");

    Ok(created(employee))
}

/// Records an attendance shift used by payroll.
async fn record_shift(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Path(id): Path<String>,
    Json(req): Json<ShiftRequest>,
) -> ApiResult<Response> {
    tenant.require_manager()?;
    let employee = state.db.employees().get_for_business(&tenant.business.id, &id).await?;
    if req.clock_out.is_some() && req.clock_in.is_none() {
        return Err(ApiError::validation("clock_out requires clock_in"));
    }

    let shift = EmployeeShift {
        id: generate_id(),
        employee_id: employee.id,
        outlet_id: req.outlet_id.or(employee.outlet_id),
        shift_date: req.shift_date,
        start_time: req.start_time,
        end_time: req.end_time,
        clock_in: req.clock_in,
        clock_out: req.clock_out,
        status: req.status,
        created_at: Utc::now(),
    };
    state.db.employees().insert_shift(&shift).await?;
    Ok(created(shift))
}
