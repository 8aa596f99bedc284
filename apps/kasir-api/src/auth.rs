//! JWT authentication, password hashing and request extractors.
//!
//! ## Request Identity
//! ```text
//! Authorization: Bearer <access token>
//!        │
//!        ▼
//! AuthUser      claims.sub → users row
//!        │
//!        ▼
//! Tenant        X-Business-Id (or the first business) checked against
//!               ownership, employment or super_admin
//! ```

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use kasir_core::{Business, Role, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Header that selects the tenant business.
pub const BUSINESS_HEADER: &str = "x-business-id";

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    /// Role at issue time, informational only; the stored role is authoritative
    pub role: Role,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,

    /// Token type ("access" or "refresh")
    pub token_type: String,
}

/// JWT token manager.
pub struct JwtManager {
    secret: String,
    access_lifetime_secs: i64,
    refresh_lifetime_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager.
    pub fn new(secret: String, access_lifetime_secs: i64, refresh_lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            access_lifetime_secs,
            refresh_lifetime_secs,
        }
    }

    pub fn access_lifetime_secs(&self) -> i64 {
        self.access_lifetime_secs
    }

    fn issue(&self, user: &User, token_type: &str, lifetime_secs: i64) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(lifetime_secs);

        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: token_type.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| {
            tracing::error!("Failed to generate {} token: {}", token_type, e);
            ApiError::internal("Failed to generate token")
        })
    }

    /// Generate an access token.
    pub fn generate_access_token(&self, user: &User) -> ApiResult<String> {
        self.issue(user, "access", self.access_lifetime_secs)
    }

    /// Generate a refresh token.
    pub fn generate_refresh_token(&self, user: &User) -> ApiResult<String> {
        self.issue(user, "refresh", self.refresh_lifetime_secs)
    }

    /// Validate and decode a token.
    pub fn validate_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();

        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }

    /// Validate that a token is an access token.
    pub fn validate_access_token(&self, token: &str) -> ApiResult<Claims> {
        let claims = self.validate_token(token)?;

        if claims.token_type != "access" {
            return Err(ApiError::unauthorized("Expected access token"));
        }

        Ok(claims)
    }

    /// Validate that a token is a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> ApiResult<Claims> {
        let claims = self.validate_token(token)?;

        if claims.token_type != "refresh" {
            return Err(ApiError::unauthorized("Expected refresh token"));
        }

        Ok(claims)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Passwords
// =============================================================================

/// Hash a password with argon2 and a random salt.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!("Password hashing failed: {}", e);
            ApiError::internal("Password hashing failed")
        })
}

/// Verify a password against a stored argon2 hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

// =============================================================================
// Extractors
// =============================================================================

/// The authenticated user.
///
/// The subscription gate resolves the user once and stores it in the request
/// extensions; handlers outside the gate resolve it from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    /// Resolves the user behind an access token.
    pub async fn from_token(state: &AppState, token: &str) -> ApiResult<User> {
        let claims = state.jwt.validate_access_token(token)?;
        state
            .db
            .users()
            .get_by_id(&claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> ApiResult<Self> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

        let user = AuthUser::from_token(state, token).await?;
        Ok(AuthUser(user))
    }
}

/// A platform operator.
#[derive(Debug, Clone)]
pub struct SuperAdmin(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for SuperAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> ApiResult<Self> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::SuperAdmin {
            return Err(ApiError::forbidden("Super admin access required"));
        }
        Ok(SuperAdmin(user))
    }
}

/// The authenticated user together with the business the request acts on.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub user: User,
    pub business: Business,
}

impl Tenant {
    /// Owners and admins manage staff, payroll and catalogue.
    pub fn require_manager(&self) -> ApiResult<()> {
        match self.user.role {
            Role::Owner | Role::Admin | Role::SuperAdmin => Ok(()),
            _ => Err(ApiError::forbidden("Owner or admin role required")),
        }
    }

    /// Resolves the tenant business for `user`.
    pub async fn resolve(state: &AppState, user: User, requested: Option<&str>) -> ApiResult<Self> {
        let business = match user.role {
            Role::SuperAdmin => {
                let id = requested
                    .ok_or_else(|| ApiError::validation("X-Business-Id header is required"))?;
                state.db.businesses().require(id).await?
            }
            role if role.is_employee() => {
                let employee = state
                    .db
                    .employees()
                    .find_by_user_id(&user.id)
                    .await?
                    .ok_or_else(|| ApiError::forbidden("Employee not assigned to any business"))?;
                if requested.is_some_and(|id| id != employee.business_id) {
                    return Err(ApiError::forbidden("Not a member of this business"));
                }
                state.db.businesses().require(&employee.business_id).await?
            }
            _ => {
                let owned = state.db.businesses().list_by_owner(&user.id).await?;
                let selected = match requested {
                    Some(id) => owned.into_iter().find(|b| b.id == id),
                    None => owned.into_iter().next(),
                };
                selected.ok_or_else(|| match requested {
                    Some(id) => ApiError::not_found("Business", id),
                    None => ApiError::not_found("Business", "current"),
                })?
            }
        };

        Ok(Tenant { user, business })
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> ApiResult<Self> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        let requested = parts
            .headers
            .get(BUSINESS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Tenant::resolve(state, user, requested.as_deref()).await
    }
}
