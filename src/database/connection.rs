//! Pool construction and schema migrations.

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use super::error::{StoreError, StoreResult};
use crate::config::DatabaseConfig;

/// Migrations under `migrations/`, embedded at compile time
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Build the shared store pool
pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    info!(
        "🗄️ DATABASE: Creating pool: {}...",
        config.url.chars().take(30).collect::<String>()
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::Connection(format!("Failed to create pool: {e}")))?;

    info!(
        max_connections = config.max_connections,
        "✅ DATABASE: Pool created"
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    info!("🔄 DATABASE: Running migrations");
    MIGRATOR.run(pool).await?;
    info!("✅ DATABASE: Migrations complete");
    Ok(())
}
