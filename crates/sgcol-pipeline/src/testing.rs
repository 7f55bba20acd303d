//! Test doubles shared by the unit tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::FixedOffset;
use serde_json::json;
use sgcol_common::{Record, ResourceId, TableName};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use crate::api::{FetchClient, Page, PageTransport};
use crate::clock::Sleeper;
use crate::config::{FetchPolicy, LoadConfig};
use crate::error::FetchError;
use crate::extract::{Dataset, Extractor};
use crate::load::{MemoryRawStore, RawLoader};
use crate::orchestrator::Orchestrator;

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// A record carrying `_id = n`
pub fn record(n: u64) -> Record {
    match json!({ "_id": n, "value": format!("row-{}", n) }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn page(ids: Range<u64>, total: u64) -> Page {
    Page {
        records: ids.map(record).collect(),
        total,
    }
}

type Script = VecDeque<Result<Page, FetchError>>;

/// Replays a fixed sequence of responses per resource id
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, u64, u32)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, resource_id: &str, responses: Vec<Result<Page, FetchError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), responses.into());
    }

    /// Offsets requested for `resource_id`, in order
    pub fn offsets(&self, resource_id: &str) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id == resource_id)
            .map(|(_, offset, _)| *offset)
            .collect()
    }
}

#[async_trait]
impl PageTransport for ScriptedTransport {
    async fn fetch_page(
        &self,
        resource_id: &ResourceId,
        offset: u64,
        limit: u32,
    ) -> Result<Page, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((resource_id.to_string(), offset, limit));

        self.scripts
            .lock()
            .unwrap()
            .get_mut(resource_id.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(FetchError::Transport(format!(
                    "no scripted response for {} at offset {}",
                    resource_id, offset
                )))
            })
    }
}

/// Records requested waits instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn count(&self, duration: Duration) -> usize {
        self.slept
            .lock()
            .unwrap()
            .iter()
            .filter(|d| **d == duration)
            .count()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Plain-text log output of the current thread
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Route this thread's events into a fresh capture until the guard drops
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Captured lines containing `needle`
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub fn sgt() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

fn dataset(key: &str, label: &str, table: &str) -> Dataset {
    Dataset {
        key: key.into(),
        label: label.into(),
        resource_id: ResourceId::new(format!("d_{}", key)).unwrap(),
        table: TableName::new(table).unwrap(),
    }
}

/// Orchestrator over the three datasets (`d_hdb`, `d_coe`, `d_cpi`), page size 2
pub fn orchestrator(transport: Arc<ScriptedTransport>, store: &MemoryRawStore) -> Orchestrator {
    let client = FetchClient::new(
        transport,
        Arc::new(RecordingSleeper::default()),
        FetchPolicy {
            page_size: 2,
            ..FetchPolicy::default()
        },
    );
    let loader = RawLoader::new(
        Arc::new(store.clone()),
        &LoadConfig {
            schema: TableName::new("raw_data").unwrap(),
            chunk_size: 1000,
        },
        sgt(),
    );
    let extractors = vec![
        Extractor::new(dataset("hdb", "HDB Resale", "hdb_resale")),
        Extractor::new(dataset("coe", "COE Results", "coe_results")),
        Extractor::new(dataset("cpi", "CPI Data", "cpi_data")),
    ];

    Orchestrator::new(client, loader, extractors, sgt())
}
