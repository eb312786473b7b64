use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connections are only held for single-row reads and inserts
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

/// Creates the PostgreSQL pool behind user personalization reads and writes
///
/// Fails fast when the database is unreachable at startup.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    tracing::info!(max_connections = max_connections, "PostgreSQL pool ready");

    Ok(pool)
}
