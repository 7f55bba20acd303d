//! Database connectivity check

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use sqlx::{Connection, PgConnection};
use tracing::info;

use crate::config::DatabaseConfig;

/// Connect, ask the server for its clock, and disconnect.
///
/// Returns the server time converted to `offset`.
pub async fn test_connection(
    config: &DatabaseConfig,
    offset: FixedOffset,
) -> Result<DateTime<FixedOffset>> {
    let mut conn = PgConnection::connect_with(&config.connect_options())
        .await
        .with_context(|| {
            format!(
                "Failed to connect to database {} at {}:{}",
                config.name, config.host, config.port
            )
        })?;

    let (now,): (DateTime<Utc>,) = sqlx::query_as("SELECT NOW()")
        .fetch_one(&mut conn)
        .await
        .context("Failed to query database time")?;

    conn.close().await.context("Failed to close database connection")?;

    let now = now.with_timezone(&offset);
    info!(database = %config.name, host = %config.host, "Database connected at: {}", now);

    Ok(now)
}
