//! Page transport
//!
//! [`PageTransport`] issues exactly one request for one page and classifies
//! the outcome. Retrying is the fetch client's job, not the transport's.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sgcol_common::ResourceId;
use std::time::Duration;
use tracing::debug;

use super::types::{ApiEnvelope, Page};
use crate::config::{ApiConfig, FetchPolicy};
use crate::error::FetchError;

/// User agent sent with every API request
pub const USER_AGENT: &str = concat!("sgcol-pipeline/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait PageTransport: Send + Sync {
    /// Request `limit` records of `resource_id` starting at `offset`
    async fn fetch_page(
        &self,
        resource_id: &ResourceId,
        offset: u64,
        limit: u32,
    ) -> Result<Page, FetchError>;
}

/// HTTP transport for the datastore search endpoint
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn from_config(api: &ApiConfig, policy: &FetchPolicy) -> reqwest::Result<Self> {
        Self::new(api.base_url.clone(), api.api_key.clone(), policy.request_timeout)
    }
}

#[async_trait]
impl PageTransport for HttpTransport {
    async fn fetch_page(
        &self,
        resource_id: &ResourceId,
        offset: u64,
        limit: u32,
    ) -> Result<Page, FetchError> {
        let mut request = self.client.get(&self.base_url).query(&[
            ("resource_id", resource_id.to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(resource_id = %resource_id, offset, limit, "Requesting page");

        let response = request.send().await.map_err(classify)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }

        if !status.is_success() {
            return Err(FetchError::Transport(format!(
                "HTTP {} from {}",
                status,
                response.url()
            )));
        }

        let body = response.bytes().await.map_err(classify)?;
        let envelope: ApiEnvelope = serde_json::from_slice(&body)
            .map_err(|e| FetchError::MalformedResponse(format!("invalid JSON body: {}", e)))?;

        envelope.into_page()
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        FetchError::RateLimited
    } else {
        FetchError::Transport(err.to_string())
    }
}
