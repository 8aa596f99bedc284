//! Registration, login, token refresh and the caller's profile.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use kasir_core::otp::normalize_phone;
use kasir_core::validation::{validate_email, validate_name, validate_password, validate_phone};
use kasir_core::{Role, User};
use kasir_db::generate_id;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{created, ok};
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/me", get(me))
        .route("/profile", put(update_profile))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ProfileRequest {
    name: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    user: User,
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: i64,
}

fn tokens(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    Ok(AuthResponse {
        access_token: state.jwt.generate_access_token(&user)?,
        refresh_token: state.jwt.generate_refresh_token(&user)?,
        token_type: "Bearer",
        expires_in: state.jwt.access_lifetime_secs(),
        user,
    })
}

/// Validates and normalizes an optional phone; blank means none.
fn clean_phone(raw: Option<&str>) -> ApiResult<Option<String>> {
    match raw.map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) => {
            validate_phone(phone)?;
            Ok(Some(normalize_phone(phone)))
        }
        None => Ok(None),
    }
}

fn clean_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Self-service sign-up creates an owner account.
async fn register(State(state): State<Arc<AppState>>, Json(req): Json<RegisterRequest>) -> ApiResult<Response> {
    validate_name("name", &req.name)?;
    validate_email(&req.email)?;
    validate_password(&req.password)?;
    let email = req.email.trim().to_ascii_lowercase();
    let phone = clean_phone(req.phone.as_deref())?;

    if state.db.users().get_by_email(&email).await?.is_some() {
        return Err(ApiError::new(ErrorCode::Duplicate, "Email already registered")
            .with_details(json!({ "field": "email" })));
    }

    let now = Utc::now();
    let user = User {
        id: generate_id(),
        name: req.name.trim().to_string(),
        email,
        phone,
        address: clean_text(req.address.as_deref()),
        role: Role::Owner,
        password_hash: hash_password(&req.password)?,
        whatsapp_verified_at: None,
        created_at: now,
        updated_at: now,
    };
    state.db.users().insert(&user).await?;
    info!(user_id = %user.id, "User registered");

    Ok(created(tokens(&state, user)?))
}

async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> ApiResult<Response> {
    let email = req.email.trim().to_ascii_lowercase();
    let user = state.db.users().get_by_email(&email).await?;

    let Some(user) = user.filter(|u| verify_password(&req.password, &u.password_hash)) else {
        warn!(email = %email, "Failed login attempt");
        return Err(ApiError::unauthorized("Invalid email or password"));
    };

    info!(user_id = %user.id, role = user.role.as_str(), "User logged in");
    Ok(ok(tokens(&state, user)?))
}

async fn refresh(State(state): State<Arc<AppState>>, Json(req): Json<RefreshRequest>) -> ApiResult<Response> {
    let claims = state.jwt.validate_refresh_token(&req.refresh_token)?;
    let user = state
        .db
        .users()
        .get_by_id(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;
    Ok(ok(tokens(&state, user)?))
}

async fn me(AuthUser(user): AuthUser) -> ApiResult<Response> {
    let missing = user.missing_profile_fields();
    Ok(ok(json!({
        "user": user,
        "profile_complete": missing.is_empty(),
        "missing_fields": missing,
    })))
}

/// Changing the phone clears the WhatsApp verification.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<Response> {
    validate_name("name", &req.name)?;
    let phone = clean_phone(req.phone.as_deref())?;

    if let Some(phone) = &phone {
        if state.db.users().phone_taken_by_other(phone, &user.id).await? {
            return Err(
                ApiError::validation("Nomor WhatsApp ini sudah terdaftar oleh user lain.")
                    .with_details(json!({ "field": "phone" })),
            );
        }
    }

    let updated = state
        .db
        .users()
        .update_profile(
            &user.id,
            req.name.trim(),
            phone.as_deref(),
            clean_text(req.address.as_deref()).as_deref(),
        )
        .await?;
    Ok(ok(updated))
}
