//! Tessera DB — durable persistence for the intent queue, batch
//! lifecycle, and shadow-table projections.
//!
//! SQLite via `sqlx`, following the workspace's own declared default
//! feature set. Each domain has its own repository module with the
//! operations the rest of the engine needs; nothing here embeds
//! business logic beyond what's necessary to make an operation atomic.

pub mod config;
pub mod error;
pub mod repos;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use repos::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Shared database handle.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!(url = %config.url, "connecting to database");

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> DbResult<()> {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        Ok(())
    }
}
