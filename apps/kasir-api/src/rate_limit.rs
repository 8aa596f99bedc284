//! Fixed-window rate limits for credential and OTP endpoints.
//!
//! ## Limits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST /api/auth/login     10 / minute    per client                     │
//! │  POST /api/auth/register   5 / minute    per client                     │
//! │  POST /api/otp/send        5 / minute    per client and per number      │
//! │  POST /api/otp/verify     10 / minute    per client                     │
//! │                                                                         │
//! │  over the limit ──► 429 TOO_MANY_REQUESTS + Retry-After                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With Redis configured the counters live there (`INCR` + `EXPIRE`) so all
//! instances share them. Without Redis, or when Redis fails, each instance
//! counts in memory.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// In-memory windows are pruned once the map grows past this.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitKind {
    Login,
    Register,
    OtpSend,
    OtpVerify,
}

impl RateLimitKind {
    /// The limited endpoint a request targets, if any.
    pub fn for_request(method: &Method, path: &str) -> Option<Self> {
        if method != Method::POST {
            return None;
        }
        match path.trim_end_matches('/') {
            "/api/auth/login" => Some(RateLimitKind::Login),
            "/api/auth/register" => Some(RateLimitKind::Register),
            "/api/otp/send" => Some(RateLimitKind::OtpSend),
            "/api/otp/verify" => Some(RateLimitKind::OtpVerify),
            _ => None,
        }
    }

    pub const fn max_attempts(self) -> u32 {
        match self {
            RateLimitKind::Login | RateLimitKind::OtpVerify => 10,
            RateLimitKind::Register | RateLimitKind::OtpSend => 5,
        }
    }

    pub const fn window(self) -> Duration {
        Duration::from_secs(60)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RateLimitKind::Login => "login",
            RateLimitKind::Register => "register",
            RateLimitKind::OtpSend => "otp_send",
            RateLimitKind::OtpVerify => "otp_verify",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts attempts per `(kind, key)`.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    redis: Option<redis::Client>,
    windows: Arc<Mutex<HashMap<(RateLimitKind, String), Window>>>,
}

impl RateLimiter {
    pub fn new(enabled: bool, redis: Option<redis::Client>) -> Self {
        RateLimiter {
            enabled,
            redis,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records one attempt, failing with 429 once the window is full.
    pub async fn check(&self, kind: RateLimitKind, key: &str) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(client) = &self.redis {
            match self.check_redis(client, kind, key).await {
                Ok(result) => return result,
                Err(e) => warn!(kind = kind.as_str(), "Redis rate limit failed, counting locally: {}", e),
            }
        }
        self.check_local(kind, key).await
    }

    async fn check_local(&self, kind: RateLimitKind, key: &str) -> ApiResult<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        if windows.len() >= PRUNE_THRESHOLD {
            windows.retain(|(k, _), w| now.duration_since(w.started) < k.window());
        }

        let window = windows
            .entry((kind, key.to_string()))
            .or_insert(Window { started: now, count: 0 });
        let elapsed = now.duration_since(window.started);
        if elapsed >= kind.window() {
            *window = Window { started: now, count: 0 };
        }

        if window.count >= kind.max_attempts() {
            let retry_after = kind.window().saturating_sub(elapsed).as_secs().max(1);
            debug!(kind = kind.as_str(), key = %key, "Rate limited");
            return Err(ApiError::too_many_requests(retry_after));
        }
        window.count += 1;
        Ok(())
    }

    /// Outer error: Redis unavailable. Inner result: the limit decision.
    async fn check_redis(
        &self,
        client: &redis::Client,
        kind: RateLimitKind,
        key: &str,
    ) -> redis::RedisResult<ApiResult<()>> {
        let redis_key = format!("ratelimit:{}:{}", kind.as_str(), key);
        let window_secs = kind.window().as_secs();
        let mut conn = client.get_multiplexed_async_connection().await?;

        let count: u64 = redis::cmd("INCR").arg(&redis_key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&redis_key)
                .arg(window_secs)
                .query_async::<i64>(&mut conn)
                .await?;
        }
        if count <= u64::from(kind.max_attempts()) {
            return Ok(Ok(()));
        }

        let ttl: i64 = redis::cmd("TTL").arg(&redis_key).query_async(&mut conn).await?;
        if ttl < 0 {
            // A key without expiry would block forever.
            redis::cmd("EXPIRE")
                .arg(&redis_key)
                .arg(window_secs)
                .query_async::<i64>(&mut conn)
                .await?;
        }
        let retry_after = u64::try_from(ttl).ok().filter(|t| *t > 0).unwrap_or(window_secs);
        debug!(kind = kind.as_str(), key = %key, "Rate limited");
        Ok(Err(ApiError::too_many_requests(retry_after)))
    }
}

/// Client identity for rate limiting: the first `X-Forwarded-For` hop when
/// the proxy is trusted, else the socket address.
pub fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| request.headers().get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Applies the per-client limit to the endpoints named by [`RateLimitKind`].
pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(kind) = RateLimitKind::for_request(request.method(), request.uri().path()) else {
        return next.run(request).await;
    };
    let key = format!("ip:{}", client_key(&request, state.config.trust_forwarded_for));
    match state.rate_limiter.check(kind, &key).await {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use axum::body::Body;

    #[test]
    fn test_only_credential_posts_are_limited() {
        assert_eq!(
            RateLimitKind::for_request(&Method::POST, "/api/auth/login"),
            Some(RateLimitKind::Login)
        );
        assert_eq!(
            RateLimitKind::for_request(&Method::POST, "/api/otp/send/"),
            Some(RateLimitKind::OtpSend)
        );
        assert_eq!(RateLimitKind::for_request(&Method::GET, "/api/auth/me"), None);
        assert_eq!(RateLimitKind::for_request(&Method::POST, "/api/auth/refresh"), None);
    }

    #[tokio::test]
    async fn test_window_fills_per_kind_and_key() {
        let limiter = RateLimiter::new(true, None);

        for _ in 0..5 {
            limiter.check(RateLimitKind::Register, "ip:10.0.0.1").await.unwrap();
        }
        let err = limiter
            .check(RateLimitKind::Register, "ip:10.0.0.1")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TooManyRequests);
        let retry_after = err.details.unwrap()["retry_after"].as_u64().unwrap();
        assert!((1..=60).contains(&retry_after));

        // Other clients and other endpoints keep their own windows.
        limiter.check(RateLimitKind::Register, "ip:10.0.0.2").await.unwrap();
        limiter.check(RateLimitKind::Login, "ip:10.0.0.1").await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_limiter_allows_everything() {
        let limiter = RateLimiter::new(false, None);
        for _ in 0..20 {
            limiter.check(RateLimitKind::OtpSend, "ip:10.0.0.1").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unreachable_redis_counts_locally() {
        let redis = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let limiter = RateLimiter::new(true, Some(redis));

        for _ in 0..5 {
            limiter.check(RateLimitKind::OtpSend, "phone:6281234567890").await.unwrap();
        }
        assert!(limiter
            .check(RateLimitKind::OtpSend, "phone:6281234567890")
            .await
            .is_err());
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let request = Request::builder()
            .uri("/api/auth/login")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request, true), "203.0.113.7");
        assert_eq!(client_key(&request, false), "unknown");
    }
}
