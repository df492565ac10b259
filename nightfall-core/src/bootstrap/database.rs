//! Database initialization

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

use crate::Config;

fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds))
}

/// Initialize database connection pool
///
/// Migrations are run separately by the binary crate.
pub async fn init_database(config: &Config) -> Result<PgPool> {
    info!(
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let pool: PgPool = pool_options(config)
        .connect(config.database_url())
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            anyhow::anyhow!("Database connection failed: {}", e)
        })?;

    info!("Database connected successfully");

    Ok(pool)
}

/// Build a pool that connects on first use.
///
/// Only a malformed URL fails here; an unreachable server surfaces later as
/// query errors.
pub fn init_database_lazy(config: &Config) -> Result<PgPool> {
    pool_options(config)
        .min_connections(0)
        .connect_lazy(config.database_url())
        .map_err(|e| anyhow::anyhow!("Invalid database URL: {}", e))
}
