//! Pipeline error types
//!
//! Fetch errors never leave [`crate::api::FetchClient::fetch_all`]; they end a
//! fetch early and are reported through [`crate::api::FetchStop`]. Load errors
//! do propagate, because a silent write failure would lose data.

use thiserror::Error;

/// Failures talking to the remote open-data API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// HTTP 429 from the remote; retried with exponential backoff
    #[error("Rate limited by remote API (HTTP 429)")]
    RateLimited,

    /// The request did not finish within the configured timeout; retried after a flat delay
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure (connection error, non-429 error status)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The body was not the expected envelope, or reported `success: false`
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Every attempt for one page was rate limited or timed out
    #[error("Retry budget of {max_retries} exhausted at offset {offset}")]
    RetryBudgetExhausted { max_retries: u32, offset: u64 },
}

impl FetchError {
    /// Whether the same page should be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::RateLimited | FetchError::Timeout(_))
    }
}

/// Failures inside a [`crate::load::RawStore`] backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection already closed")]
    Closed,

    #[error("{0}")]
    Backend(String),
}

/// Failures while writing raw rows
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Could not open a storage connection for {table}: {source}")]
    Connect {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to serialize a record for {table}: {source}")]
    Serialization {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage write failed for {table} (chunk {chunk}): {source}")]
    StorageWrite {
        table: String,
        chunk: usize,
        #[source]
        source: StoreError,
    },
}
