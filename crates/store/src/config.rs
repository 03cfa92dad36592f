//! Store configuration and pool construction.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::StoreError;

/// Store configuration, read from the environment with dev fallbacks.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Upper bound on how long a placement transaction waits for contended
    /// product-row locks before failing with a transient error.
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/anvilcrm".to_string(),
            max_connections: 8,
            lock_timeout: Duration::from_millis(5_000),
        }
    }
}

impl StoreConfig {
    /// Read `DATABASE_URL`, `CRM_DB_MAX_CONNECTIONS` and
    /// `CRM_LOCK_TIMEOUT_MS`, falling back to dev defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            tracing::warn!("DATABASE_URL not set; using local dev default");
            defaults.database_url.clone()
        });

        let max_connections = std::env::var("CRM_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_connections);

        let lock_timeout = std::env::var("CRM_LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.lock_timeout);

        Self {
            database_url,
            max_connections,
            lock_timeout,
        }
    }

    /// Open a connection pool against the configured database.
    pub async fn connect(&self) -> Result<PgPool, StoreError> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("connect: {e}")))
    }
}
