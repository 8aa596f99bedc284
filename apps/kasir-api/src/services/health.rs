//! Health checks for monitoring.

use chrono::{DateTime, Utc};
use kasir_db::Database;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingStatus {
    Serving,
    NotServing,
    Unknown,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ServingStatus,
    pub message: String,
    pub server_time: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HealthService {
    db: Database,
    redis: Option<redis::Client>,
}

impl HealthService {
    pub fn new(db: Database, redis: Option<redis::Client>) -> Self {
        HealthService { db, redis }
    }

    /// Checks one component (`database`, `redis`) or, for an empty name or
    /// `overall`, the whole system.
    pub async fn check(&self, service: &str) -> HealthReport {
        let (status, message) = match service {
            "" | "overall" => self.check_overall().await,
            "database" => self.check_database().await,
            "redis" => self.check_redis().await,
            _ => (ServingStatus::Unknown, format!("Unknown service: {}", service)),
        };
        HealthReport {
            status,
            message,
            server_time: Utc::now(),
        }
    }

    async fn check_overall(&self) -> (ServingStatus, String) {
        let (status, message) = self.check_database().await;
        if status != ServingStatus::Serving {
            return (ServingStatus::NotServing, format!("Database unhealthy: {}", message));
        }

        // Redis is optional: a failure degrades but does not take us down
        if self.redis.is_some() {
            let (status, message) = self.check_redis().await;
            if status != ServingStatus::Serving {
                return (ServingStatus::Serving, format!("Degraded: Redis unhealthy - {}", message));
            }
        }

        (ServingStatus::Serving, "All systems operational".to_string())
    }

    async fn check_database(&self) -> (ServingStatus, String) {
        match sqlx::query("SELECT 1").execute(self.db.pool()).await {
            Ok(_) => (ServingStatus::Serving, "Database connected".to_string()),
            Err(e) => (ServingStatus::NotServing, format!("Database error: {}", e)),
        }
    }

    async fn check_redis(&self) -> (ServingStatus, String) {
        let Some(client) = &self.redis else {
            return (ServingStatus::Unknown, "Redis not configured".to_string());
        };
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => match redis::cmd("PING").query_async::<String>(&mut conn).await {
                Ok(_) => (ServingStatus::Serving, "Redis connected".to_string()),
                Err(e) => (ServingStatus::NotServing, format!("Redis ping failed: {}", e)),
            },
            Err(e) => (ServingStatus::NotServing, format!("Redis connection failed: {}", e)),
        }
    }
}
