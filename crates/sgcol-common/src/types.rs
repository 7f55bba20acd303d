//! Domain types used across the pipeline

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{EtlError, Result};

/// One row as returned by the remote API.
///
/// The schema is defined by the origin dataset and is never validated here:
/// a record is stored exactly as received.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// strftime pattern for batch identifiers, e.g. `20260301_020000`
pub const BATCH_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// PostgreSQL truncates identifiers longer than this.
pub const MAX_IDENTIFIER_LEN: usize = 63;

// ============================================================================
// Resource Identifier
// ============================================================================

/// Identifier of a dataset on the remote open-data API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(EtlError::InvalidResourceId("resource id cannot be empty".to_string()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(EtlError::InvalidResourceId(format!(
                "'{}' contains whitespace",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourceId {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Batch Identifier
// ============================================================================

/// Groups every row written by one pipeline run.
///
/// Derived from the run's start time at second resolution, so two runs that
/// start within the same second share an id. It is a grouping tag, not a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Wrap an existing identifier (e.g. one supplied by an operator)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identifier from a point in time, in that time's zone
    pub fn from_datetime<Tz>(at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self(at.format(BATCH_ID_FORMAT).to_string())
    }

    /// Derive the identifier from the current time in `offset`
    pub fn now(offset: FixedOffset) -> Self {
        Self::from_datetime(&Utc::now().with_timezone(&offset))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Table Name
// ============================================================================

/// A SQL identifier that is safe to interpolate into statements.
///
/// Only lowercase ASCII letters, digits and underscores are accepted, and the
/// first character may not be a digit. Schemas use the same rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
            return Err(EtlError::InvalidTableName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `schema.table`
    pub fn qualified(&self, schema: &TableName) -> String {
        format!("{}.{}", schema.0, self.0)
    }
}

impl FromStr for TableName {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Time Zone Helpers
// ============================================================================

/// Parse an offset such as `+08:00` or `-05:30`
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    FixedOffset::from_str(value.trim()).map_err(|_| EtlError::InvalidUtcOffset(value.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_resource_id_trims_and_rejects_blank() {
        let id = ResourceId::new("  d_8b84c4ee58e3cfc0ece0d773c8ca6abc ").unwrap();
        assert_eq!(id.as_str(), "d_8b84c4ee58e3cfc0ece0d773c8ca6abc");

        assert!(ResourceId::new("").is_err());
        assert!(ResourceId::new("   ").is_err());
        assert!(ResourceId::new("d_1 d_2").is_err());
    }

    #[test]
    fn test_batch_id_uses_local_wall_clock() {
        let sgt = FixedOffset::east_opt(8 * 3600).unwrap();
        let at = sgt
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2026, 3, 1)
                    .unwrap()
                    .and_hms_opt(2, 0, 5)
                    .unwrap(),
            )
            .unwrap();

        assert_eq!(BatchId::from_datetime(&at).as_str(), "20260301_020005");
    }

    #[test]
    fn test_batch_ids_differ_across_seconds() {
        let utc = Utc.with_ymd_and_hms(2026, 1, 31, 18, 0, 0).unwrap();
        let later = utc + chrono::Duration::seconds(1);

        assert_ne!(BatchId::from_datetime(&utc), BatchId::from_datetime(&later));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(TableName::new("hdb_resale").is_ok());
        assert!(TableName::new("_staging2").is_ok());

        assert!(TableName::new("").is_err());
        assert!(TableName::new("2fast").is_err());
        assert!(TableName::new("HDB").is_err());
        assert!(TableName::new("hdb; DROP TABLE x").is_err());
        assert!(TableName::new("raw_data.hdb").is_err());
        assert!(TableName::new("a".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn test_table_name_qualified() {
        let schema = TableName::new("raw_data").unwrap();
        let table = TableName::new("coe_results").unwrap();

        assert_eq!(table.qualified(&schema), "raw_data.coe_results");
    }

    #[test]
    fn test_table_name_deserialize_validates() {
        let ok: TableName = serde_json::from_str("\"cpi_data\"").unwrap();
        assert_eq!(ok.as_str(), "cpi_data");

        assert!(serde_json::from_str::<TableName>("\"cpi-data\"").is_err());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+08:00").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert!(parse_utc_offset("SGT").is_err());
    }
}
