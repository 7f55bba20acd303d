//! Raw loader
//!
//! Writes fetched records verbatim, one JSON document per row, tagged with the
//! run's batch id. Rows go out in fixed-size chunks, each in its own
//! transaction: a failing chunk is rolled back, earlier chunks stay committed.
//!
//! Storage sits behind [`RawStore`] / [`RawConnection`]; the PostgreSQL
//! backend lives in [`postgres`], an in-memory one in [`memory`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::FixedOffset;
use sgcol_common::{format::group_thousands, BatchId, Record, TableName};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::LoadConfig;
use crate::error::{LoadError, StoreError};

pub use memory::{MemoryRawStore, StoredRow};
pub use postgres::PgRawStore;

/// Opens connections to raw storage
#[async_trait]
pub trait RawStore: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RawConnection>, StoreError>;
}

/// One open storage session
#[async_trait]
pub trait RawConnection: Send {
    /// Append `(source_data, batch_id)` rows to `target` atomically.
    ///
    /// `target` is a validated `schema.table` name. On error nothing from
    /// this chunk is persisted.
    async fn write_chunk(
        &mut self,
        target: &str,
        rows: &[String],
        batch_id: &BatchId,
    ) -> Result<(), StoreError>;

    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Chunked writer for the raw tables
#[derive(Clone)]
pub struct RawLoader {
    store: Arc<dyn RawStore>,
    schema: TableName,
    chunk_size: usize,
    utc_offset: FixedOffset,
}

impl RawLoader {
    pub fn new(store: Arc<dyn RawStore>, config: &LoadConfig, utc_offset: FixedOffset) -> Self {
        Self {
            store,
            schema: config.schema.clone(),
            chunk_size: config.chunk_size.max(1),
            utc_offset,
        }
    }

    /// Write `records` into `<schema>.<table>`, returning the number of rows written.
    ///
    /// Without a `batch_id` one is derived from the current time. An empty
    /// slice never opens a connection.
    pub async fn load_raw(
        &self,
        records: &[Record],
        table: &TableName,
        batch_id: Option<&BatchId>,
    ) -> Result<u64, LoadError> {
        let target = table.qualified(&self.schema);

        if records.is_empty() {
            warn!(table = %target, "No data to load into {}", target);
            return Ok(0);
        }

        let batch_id = batch_id
            .cloned()
            .unwrap_or_else(|| BatchId::now(self.utc_offset));

        let mut conn = match self.store.connect().await {
            Ok(conn) => conn,
            Err(source) => {
                let e = LoadError::Connect {
                    table: target.clone(),
                    source,
                };
                error!(table = %target, batch_id = %batch_id, error = %e, "Error loading data into {}", target);
                return Err(e);
            },
        };

        let result = self
            .write_chunks(conn.as_mut(), records, &target, &batch_id)
            .await;

        if let Err(e) = conn.close().await {
            warn!(table = %target, error = %e, "Failed to close storage connection");
        }

        match result {
            Ok(written) => {
                info!(
                    table = %target,
                    batch_id = %batch_id,
                    "Loaded {} records into {} (batch {})",
                    group_thousands(written),
                    target,
                    batch_id
                );
                Ok(written)
            },
            Err(e) => {
                error!(table = %target, batch_id = %batch_id, error = %e, "Error loading data into {}", target);
                Err(e)
            },
        }
    }

    async fn write_chunks(
        &self,
        conn: &mut dyn RawConnection,
        records: &[Record],
        target: &str,
        batch_id: &BatchId,
    ) -> Result<u64, LoadError> {
        let total = records.len() as u64;
        let mut written: u64 = 0;

        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            let rows = chunk
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| LoadError::Serialization {
                    table: target.to_string(),
                    source,
                })?;

            conn.write_chunk(target, &rows, batch_id)
                .await
                .map_err(|source| LoadError::StorageWrite {
                    table: target.to_string(),
                    chunk: index + 1,
                    source,
                })?;

            written += rows.len() as u64;
            info!(
                table = %target,
                "Loaded {} / {} into {}",
                group_thousands(written),
                group_thousands(total),
                target
            );
        }

        Ok(written)
    }
}
