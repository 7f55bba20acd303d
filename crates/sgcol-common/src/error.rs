//! Error types shared across the sgcol workspace

use thiserror::Error;

/// Result type alias for sgcol common operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Validation errors for the shared identifier types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EtlError {
    #[error("Invalid resource id: {0}")]
    InvalidResourceId(String),

    #[error("Invalid table name '{0}': use lowercase letters, digits and underscores (max 63 chars)")]
    InvalidTableName(String),

    #[error("Invalid UTC offset '{0}': expected a value like +08:00")]
    InvalidUtcOffset(String),
}
