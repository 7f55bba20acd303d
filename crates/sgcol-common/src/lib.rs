//! SG Cost of Living Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup, and error handling for the sgcol workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the base [`EtlError`] and [`Result`] alias
//! - **Types**: identifiers that cross crate boundaries ([`ResourceId`],
//!   [`BatchId`], [`TableName`]) and the opaque [`Record`]
//! - **Logging**: console + rolling file `tracing` setup
//! - **Format**: count formatting for progress log lines
//!
//! # Example
//!
//! ```no_run
//! use sgcol_common::{BatchId, TableName};
//!
//! fn target() -> sgcol_common::Result<(TableName, BatchId)> {
//!     let table: TableName = "hdb_resale".parse()?;
//!     let offset = sgcol_common::types::parse_utc_offset("+08:00")?;
//!     Ok((table, BatchId::now(offset)))
//! }
//! ```

pub mod error;
pub mod format;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{EtlError, Result};
pub use types::{BatchId, Record, ResourceId, TableName};
