//! In-memory raw store, used by `run-once --dry-run` and the tests

use async_trait::async_trait;
use sgcol_common::BatchId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{RawConnection, RawStore};
use crate::error::StoreError;

/// One stored row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub source_data: String,
    pub batch_id: BatchId,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Vec<StoredRow>>,
    connects: usize,
    closes: usize,
    writes: usize,
    commits: Vec<usize>,
    fail_on_write: Option<usize>,
    fail_connect: bool,
}

/// Raw store keeping rows in process memory.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryRawStore {
    state: Arc<Mutex<State>>,
}

impl MemoryRawStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th chunk write (1-based, counted across all connections)
    pub fn with_failure_on_chunk(self, n: usize) -> Self {
        self.lock().fail_on_write = Some(n);
        self
    }

    /// Refuse every connection attempt
    pub fn with_connect_failure(self) -> Self {
        self.lock().fail_connect = true;
        self
    }

    pub fn rows(&self, target: &str) -> Vec<StoredRow> {
        self.lock().tables.get(target).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, target: &str) -> usize {
        self.lock().tables.get(target).map_or(0, Vec::len)
    }

    /// Distinct batch ids in `target`, in first-seen order
    pub fn batch_ids(&self, target: &str) -> Vec<BatchId> {
        let mut ids: Vec<BatchId> = Vec::new();
        for row in self.rows(target) {
            if !ids.contains(&row.batch_id) {
                ids.push(row.batch_id);
            }
        }
        ids
    }

    /// Row count of every committed chunk, in order
    pub fn commits(&self) -> Vec<usize> {
        self.lock().commits.clone()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RawStore for MemoryRawStore {
    async fn connect(&self) -> Result<Box<dyn RawConnection>, StoreError> {
        let mut state = self.lock();
        if state.fail_connect {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        state.connects += 1;

        Ok(Box::new(MemoryRawConnection {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

struct MemoryRawConnection {
    state: Arc<Mutex<State>>,
    open: bool,
}

#[async_trait]
impl RawConnection for MemoryRawConnection {
    async fn write_chunk(
        &mut self,
        target: &str,
        rows: &[String],
        batch_id: &BatchId,
    ) -> Result<(), StoreError> {
        if !self.open {
            return Err(StoreError::Closed);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.writes += 1;
        if state.fail_on_write == Some(state.writes) {
            return Err(StoreError::Backend(format!(
                "simulated failure on chunk {}",
                state.writes
            )));
        }

        state
            .tables
            .entry(target.to_string())
            .or_default()
            .extend(rows.iter().map(|row| StoredRow {
                source_data: row.clone(),
                batch_id: batch_id.clone(),
            }));
        state.commits.push(rows.len());

        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if self.open {
            self.open = false;
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .closes += 1;
        }
        Ok(())
    }
}
