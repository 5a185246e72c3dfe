//! Postgres support for presence rules: pool construction, configuration and
//! the [`DatabasePresenceVerifier`].

pub mod config;
pub mod presence;

use sqlx::postgres::PgPoolOptions;

pub use config::{ConfigError, DatabaseConfig};
pub use presence::DatabasePresenceVerifier;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from the given configuration.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    tracing::info!(max_connections = config.max_connections, "Database pool created");
    Ok(pool)
}

/// Verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
}
