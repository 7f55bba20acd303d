//! Dataset extractors
//!
//! An [`Extractor`] binds one configured [`Dataset`] to the fetch client.
//! It adds logging context and nothing else.

use sgcol_common::{Record, ResourceId, TableName};
use tracing::{info, instrument};

use crate::api::FetchClient;

/// A remote resource and the raw table it lands in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// Short key used in logs and summaries (`hdb`, `coe`, `cpi`)
    pub key: String,
    /// Human readable name
    pub label: String,
    pub resource_id: ResourceId,
    pub table: TableName,
}

#[derive(Debug, Clone)]
pub struct Extractor {
    dataset: Dataset,
}

impl Extractor {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Fetch every record of the dataset; partial on fetch failure, never an error
    #[instrument(skip_all, fields(dataset = %self.dataset.key))]
    pub async fn extract(&self, client: &FetchClient) -> Vec<Record> {
        info!("Extracting {} data...", self.dataset.label);

        client
            .fetch_all(&self.dataset.resource_id, &self.dataset.label)
            .await
            .into_records()
    }
}
