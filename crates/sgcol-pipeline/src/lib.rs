//! SG Cost of Living ETL Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pulls Singapore open-data datasets from data.gov.sg and lands them,
//! untransformed, in PostgreSQL raw tables tagged with a per-run batch id.
//!
//! # Datasets
//!
//! - **HDB Resale**: resale flat transactions -> `raw_data.hdb_resale`
//! - **COE Results**: certificate of entitlement bidding -> `raw_data.coe_results`
//! - **CPI Data**: consumer price index -> `raw_data.cpi_data`
//!
//! # Layout
//!
//! - [`api`]: paginated fetch client with rate-limit aware retries
//! - [`extract`]: one extractor per dataset
//! - [`load`]: chunked raw loader and its storage backends
//! - [`orchestrator`]: extract-then-load run under one batch id
//! - [`scheduler`]: daily trigger
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sgcol_pipeline::{config::Config, load::PgRawStore, orchestrator::Orchestrator};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(PgRawStore::from_config(&config.database));
//!     let summary = Orchestrator::from_config(&config, store)?.run().await?;
//!     println!("loaded {} rows", summary.total_loaded());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use error::{FetchError, LoadError, StoreError};
