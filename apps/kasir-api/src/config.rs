//! API server configuration.
//!
//! Loaded in layers, later sources winning:
//!
//! ```text
//! defaults (below) → ./kasir.toml (optional) → environment variables
//! ```
//!
//! Environment keys are the field names uppercased (`HTTP_PORT`,
//! `DATABASE_URL`, `JWT_SECRET`, ...).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Secret used when none is configured. Accepted for development only.
pub const DEV_JWT_SECRET: &str = "kasir-dev-secret-change-in-production";

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listen port
    pub http_port: u16,

    /// SQLite path or `sqlite:` URL
    pub database_url: String,

    /// Connection pool size
    pub database_max_connections: u32,

    /// Redis connection string (optional, used for webhook idempotency)
    #[serde(default)]
    pub redis_url: Option<String>,

    /// JWT secret key for signing tokens
    pub jwt_secret: String,

    /// JWT access token lifetime in seconds
    pub jwt_access_lifetime_secs: i64,

    /// JWT refresh token lifetime in seconds
    pub jwt_refresh_lifetime_secs: i64,

    /// Midtrans server key. Without it notification signatures are not checked.
    #[serde(default)]
    pub midtrans_server_key: Option<String>,

    /// Dashboard base URL, used for receipt links and reminder messages
    pub frontend_url: String,

    /// Seconds between background sweeps
    pub sweep_interval_secs: u64,

    /// Allow any origin (development dashboards on random ports)
    pub cors_allow_any: bool,

    /// Per-client limits on login, registration and OTP endpoints
    #[serde(default = "default_true")]
    pub rate_limit_enabled: bool,

    /// Key rate limits on the first `X-Forwarded-For` hop (behind a proxy)
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from defaults, `kasir.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("http_port", 8080)?
            .set_default("database_url", "./kasir_dev.db")?
            .set_default("database_max_connections", 10)?
            .set_default("jwt_secret", DEV_JWT_SECRET)?
            .set_default("jwt_access_lifetime_secs", 3600)? // 1 hour
            .set_default("jwt_refresh_lifetime_secs", 604_800)? // 7 days
            .set_default("frontend_url", "http://localhost:5173")?
            .set_default("sweep_interval_secs", 300)?
            .set_default("cors_allow_any", false)?
            .set_default("rate_limit_enabled", true)?
            .set_default("trust_forwarded_for", false)?
            .add_source(File::with_name("kasir").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make the server misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("DATABASE_URL".to_string()));
        }
        if self.database_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS".to_string()));
        }
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if self.jwt_access_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue("JWT_ACCESS_LIFETIME_SECS".to_string()));
        }
        if self.jwt_refresh_lifetime_secs <= self.jwt_access_lifetime_secs {
            return Err(ConfigError::InvalidValue("JWT_REFRESH_LIFETIME_SECS".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("SWEEP_INTERVAL_SECS".to_string()));
        }

        if self.jwt_secret == DEV_JWT_SECRET {
            warn!("JWT_SECRET not set, using the development secret");
        }
        if self.midtrans_server_key.is_none() {
            warn!("MIDTRANS_SERVER_KEY not set, payment notifications are accepted unsigned");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            http_port: 8080,
            database_url: "./kasir_dev.db".to_string(),
            database_max_connections: 10,
            redis_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_access_lifetime_secs: 3600,
            jwt_refresh_lifetime_secs: 604_800,
            midtrans_server_key: None,
            frontend_url: "http://localhost:5173".to_string(),
            sweep_interval_secs: 300,
            cors_allow_any: false,
            rate_limit_enabled: true,
            trust_forwarded_for: false,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
