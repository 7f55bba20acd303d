//! Pipeline orchestrator
//!
//! One run extracts every configured dataset, then loads each into its raw
//! table under a single batch id. Runs are strictly sequential.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use sgcol_common::{format::group_thousands, BatchId, Record, TableName};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::api::{FetchClient, HttpTransport};
use crate::clock::TokioSleeper;
use crate::config::Config;
use crate::extract::{Dataset, Extractor};
use crate::load::{RawLoader, RawStore};

const BANNER_WIDTH: usize = 60;

/// Per-dataset outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub key: String,
    pub label: String,
    pub table: TableName,
    pub fetched: usize,
    pub loaded: u64,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub batch_id: BatchId,
    pub datasets: Vec<DatasetSummary>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total_loaded(&self) -> u64 {
        self.datasets.iter().map(|d| d.loaded).sum()
    }

    pub fn dataset(&self, key: &str) -> Option<&DatasetSummary> {
        self.datasets.iter().find(|d| d.key == key)
    }
}

pub struct Orchestrator {
    client: FetchClient,
    loader: RawLoader,
    extractors: Vec<Extractor>,
    utc_offset: FixedOffset,
}

impl Orchestrator {
    pub fn new(
        client: FetchClient,
        loader: RawLoader,
        extractors: Vec<Extractor>,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            client,
            loader,
            extractors,
            utc_offset,
        }
    }

    /// Wire the HTTP transport, tokio timer and `store` from configuration
    pub fn from_config(config: &Config, store: Arc<dyn RawStore>) -> Result<Self> {
        let transport = HttpTransport::from_config(&config.api, &config.fetch)
            .context("Failed to build HTTP client")?;
        let client = FetchClient::new(
            Arc::new(transport),
            Arc::new(TokioSleeper),
            config.fetch.clone(),
        );
        let loader = RawLoader::new(store, &config.load, config.schedule.utc_offset);
        let extractors = config.datasets.iter().cloned().map(Extractor::new).collect();

        Ok(Self::new(client, loader, extractors, config.schedule.utc_offset))
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.extractors.iter().map(Extractor::dataset)
    }

    /// Run now
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_started_at(Utc::now()).await
    }

    /// Run with the batch id derived from `started_at`
    pub async fn run_started_at(&self, started_at: DateTime<Utc>) -> Result<RunSummary> {
        let batch_id = BatchId::from_datetime(&started_at.with_timezone(&self.utc_offset));
        self.run_with_batch(batch_id).await
    }

    pub async fn run_with_batch(&self, batch_id: BatchId) -> Result<RunSummary> {
        let started = Instant::now();

        info!("{}", "=".repeat(BANNER_WIDTH));
        info!(batch_id = %batch_id, "Starting ETL pipeline - Batch ID: {}", batch_id);
        info!("{}", "=".repeat(BANNER_WIDTH));

        let mut extracted: Vec<(&Dataset, Vec<Record>)> = Vec::with_capacity(self.extractors.len());
        for extractor in &self.extractors {
            let records = extractor.extract(&self.client).await;
            extracted.push((extractor.dataset(), records));
        }

        let mut datasets = Vec::with_capacity(extracted.len());
        for (dataset, records) in &extracted {
            let loaded = self
                .loader
                .load_raw(records, &dataset.table, Some(&batch_id))
                .await
                .with_context(|| format!("Failed to load {} data", dataset.label))?;

            datasets.push(DatasetSummary {
                key: dataset.key.clone(),
                label: dataset.label.clone(),
                table: dataset.table.clone(),
                fetched: records.len(),
                loaded,
            });
        }

        let summary = RunSummary {
            batch_id,
            datasets,
            elapsed: started.elapsed(),
        };

        info!("{}", "=".repeat(BANNER_WIDTH));
        info!(batch_id = %summary.batch_id, "Pipeline completed successfully");
        for dataset in &summary.datasets {
            info!(
                dataset = %dataset.key,
                "{}: {} records",
                dataset.label,
                group_thousands(dataset.loaded)
            );
        }
        info!("Duration: {:.2}s", summary.elapsed.as_secs_f64());
        info!("{}", "=".repeat(BANNER_WIDTH));

        Ok(summary)
    }

    /// Run, logging any failure instead of returning it
    pub async fn run_logged(&self, started_at: DateTime<Utc>) -> Option<RunSummary> {
        match self.run_started_at(started_at).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(error = ?e, "Pipeline failed: {:#}", e);
                None
            },
        }
    }
}
