//! Postgres connection pool and the embedded workflow schema.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Shared Postgres pool behind [`crate::PgStore`].
pub type DbPool = PgPool;

/// How long a caller waits for a free connection before the query fails.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect to `database_url` with at most `max_connections` open connections.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!(max_connections, "connecting to workflow database");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the four workflow tables from `migrations/` at the workspace root.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("applying workflow schema migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
