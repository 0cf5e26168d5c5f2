//! # Async Database Management Module (sqlx + SQLite)
//!
//! [`DatabaseManager`] owns the connection pool and runs the embedded
//! migrations. Store operations are split across submodules as additional
//! `impl DatabaseManager` blocks, one per logical table:
//!
//! | module                | table                    |
//! |-----------------------|--------------------------|
//! | [`list_store`]        | `call_lists`             |
//! | [`item_store`]        | `call_list_items`        |
//! | [`disposition_store`] | `call_list_dispositions` |
//! | [`session_store`]     | `call_sessions`          |
//! | [`call_log_store`]    | `call_logs`              |
//!
//! Timestamps are bound as `DateTime<Utc>`, which sqlx encodes as RFC 3339
//! text with a fixed `+00:00` offset, so the SQL below compares them as text.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dialer_engine::database::DatabaseManager;
//!
//! # async fn example() -> dialer_engine::Result<()> {
//! let db = DatabaseManager::new_in_memory().await?;
//! let lists = db.list_call_lists(true).await?;
//! assert!(lists.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod call_log_store;
pub mod disposition_store;
pub mod item_store;
pub mod list_store;
pub mod session_store;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::{DialerError, Result};

pub use sqlx;

/// Main database manager using sqlx for async operations
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Connect and run migrations
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Initializing dialer database: {}", config.database_url);

        let in_memory = config.is_in_memory();
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .journal_mode(if in_memory { SqliteJournalMode::Memory } else { SqliteJournalMode::Wal })
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .foreign_keys(true)
            .create_if_missing(true);

        // Every connection to `:memory:` opens a fresh database, so the
        // in-memory store is pinned to one connection that is never recycled.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DialerError::database(format!("failed to connect to database: {}", e)))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ Dialer database ready");
        Ok(Self { pool })
    }

    /// Create an in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(&DatabaseConfig {
            database_url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DialerError::database(format!("failed to start transaction: {}", e)))
    }

    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                debug!("💚 Database health check passed");
                true
            }
            Err(e) => {
                error!("❌ Database health check failed: {}", e);
                false
            }
        }
    }
}

/// True when a sqlx error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("UNIQUE constraint failed"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_creation() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_send_safety() {
        let db = DatabaseManager::new_in_memory().await.unwrap();

        let handle = tokio::spawn(async move { db.health_check().await });

        assert!(handle.await.unwrap());
    }
}
