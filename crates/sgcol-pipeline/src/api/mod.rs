//! Remote open-data API access

pub mod client;
pub mod transport;
pub mod types;

pub use client::{FetchClient, FetchOutcome, FetchStop};
pub use transport::{HttpTransport, PageTransport};
pub use types::Page;
