//! PostgreSQL raw store
//!
//! One `PgConnection` per load call, no pool. Each chunk is a single
//! multi-row `INSERT` inside its own transaction. Tables are expected to
//! exist as `<schema>.<table>(source_data JSONB|JSON|TEXT, batch_id TEXT)`.
//!
//! Rows are bound as text. A `JSONB` column gets a `::jsonb` cast and stores
//! the normalized document. `JSON` columns get `::json`, which validates the
//! row but keeps its text, and `TEXT` columns take the string unchanged.

use async_trait::async_trait;
use sgcol_common::BatchId;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::debug;

use super::{RawConnection, RawStore};
use crate::config::DatabaseConfig;
use crate::error::StoreError;

pub struct PgRawStore {
    options: PgConnectOptions,
}

impl PgRawStore {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(config.connect_options())
    }
}

#[async_trait]
impl RawStore for PgRawStore {
    async fn connect(&self) -> Result<Box<dyn RawConnection>, StoreError> {
        let conn = PgConnection::connect_with(&self.options).await?;
        Ok(Box::new(PgRawConnection {
            conn: Some(conn),
            casts: HashMap::new(),
        }))
    }
}

/// Cast applied to the bound row for a `source_data` column of `data_type`
fn source_data_cast(data_type: Option<&str>) -> &'static str {
    match data_type {
        Some("json") => "::json",
        Some("text") | Some("character varying") => "",
        // unknown tables fall through to the insert, which reports them
        _ => "::jsonb",
    }
}

struct PgRawConnection {
    conn: Option<PgConnection>,
    /// `source_data` cast per target, looked up once per connection
    casts: HashMap<String, &'static str>,
}

impl PgRawConnection {
    async fn cast_for(&mut self, target: &str) -> Result<&'static str, StoreError> {
        if let Some(&cast) = self.casts.get(target) {
            return Ok(cast);
        }

        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;
        let (schema, table) = target.split_once('.').unwrap_or(("public", target));
        let data_type: Option<String> = sqlx::query_scalar(
            "SELECT data_type::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 AND column_name = 'source_data'",
        )
        .bind(schema)
        .bind(table)
        .fetch_optional(&mut *conn)
        .await?;

        let cast = source_data_cast(data_type.as_deref());
        debug!(table = target, column_type = ?data_type, cast, "Resolved source_data column");
        self.casts.insert(target.to_string(), cast);
        Ok(cast)
    }
}

#[async_trait]
impl RawConnection for PgRawConnection {
    async fn write_chunk(
        &mut self,
        target: &str,
        rows: &[String],
        batch_id: &BatchId,
    ) -> Result<(), StoreError> {
        let cast = self.cast_for(target).await?;
        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;

        // target is built from validated identifiers only
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} (source_data, batch_id) ", target));
        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(row.as_str())
                .push_unseparated(cast)
                .push_bind(batch_id.as_str());
        });

        let mut tx = conn.begin().await?;

        match query_builder.build().execute(&mut *tx).await {
            Ok(result) => {
                tx.commit().await?;
                debug!(table = target, rows = result.rows_affected(), "Chunk committed");
                Ok(())
            },
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    debug!(table = target, error = %rollback, "Rollback failed");
                }
                Err(e.into())
            },
        }
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}
