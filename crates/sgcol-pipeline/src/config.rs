//! Configuration management
//!
//! Everything is sourced from the environment (a `.env` file is honoured via
//! `dotenvy`). The resulting [`Config`] is built once in `main` and handed to
//! each component; nothing below reads the environment on its own.

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime};
use sgcol_common::{types::parse_utc_offset, ResourceId, TableName};
use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;
use std::time::Duration;

use crate::extract::Dataset;

// ============================================================================
// Database Defaults (local development)
// ============================================================================

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "sgcol";
pub const DEFAULT_DB_USER: &str = "postgres";

// ============================================================================
// Remote API Defaults
// ============================================================================

/// data.gov.sg CKAN datastore search action
pub const DEFAULT_DATAGOV_BASE_URL: &str = "https://data.gov.sg/api/action/datastore_search";

/// Records requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 2000;

/// Pause after a successful page, keeps us under the public rate limit
pub const DEFAULT_INTER_REQUEST_DELAY_SECS: u64 = 8;

/// Attempts allowed per page before the fetch gives up
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Extra pause after a page that needed at least one retry
pub const DEFAULT_COOLDOWN_SECS: u64 = 15;

/// Per-request HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// First rate-limit backoff; doubles on every further retry
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 10;

/// Flat wait after a timed out request
pub const DEFAULT_TIMEOUT_DELAY_SECS: u64 = 10;

// ============================================================================
// Loader Defaults
// ============================================================================

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_RAW_SCHEMA: &str = "raw_data";

/// Two bind parameters per row, PostgreSQL allows 65535 per statement.
pub const MAX_CHUNK_SIZE: usize = 32_767;

// ============================================================================
// Schedule Defaults
// ============================================================================

pub const DEFAULT_RUN_AT: &str = "02:00";

/// Singapore time
pub const DEFAULT_UTC_OFFSET: &str = "+08:00";

pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// (key, display label, resource id variable, target table)
const DATASETS: [(&str, &str, &str, &str); 3] = [
    ("hdb", "HDB Resale", "DATAGOV_HDB_RESOURCE_ID", "hdb_resale"),
    ("coe", "COE Results", "DATAGOV_COE_RESOURCE_ID", "coe_results"),
    ("cpi", "CPI Data", "DATAGOV_CPI_RESOURCE_ID", "cpi_data"),
];

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub fetch: FetchPolicy,
    pub load: LoadConfig,
    pub schedule: ScheduleConfig,
    pub datasets: Vec<Dataset>,
}

/// PostgreSQL connection parameters
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// Remote open-data API settings
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
}

/// Paging, retry and pacing rules for the fetch client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub page_size: u32,
    pub inter_request_delay: Duration,
    pub max_retries: u32,
    pub cooldown: Duration,
    pub request_timeout: Duration,
    pub backoff_base: Duration,
    pub timeout_delay: Duration,
}

/// Raw loader settings
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub schema: TableName,
    pub chunk_size: usize,
}

/// Daily trigger settings
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    /// Wall-clock time of the daily run, in `utc_offset`
    pub run_at: NaiveTime,
    pub utc_offset: FixedOffset,
    /// How often the long-running process checks whether the run is due
    pub check_interval: Duration,
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            database: DatabaseConfig::from_lookup(&lookup)?,
            api: ApiConfig {
                base_url: non_empty(&lookup, "DATAGOV_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_DATAGOV_BASE_URL.to_string()),
                api_key: non_empty(&lookup, "DATAGOV_API_KEY"),
            },
            fetch: FetchPolicy {
                page_size: parse_or(&lookup, "FETCH_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
                inter_request_delay: secs_or(
                    &lookup,
                    "FETCH_INTER_REQUEST_DELAY_SECS",
                    DEFAULT_INTER_REQUEST_DELAY_SECS,
                )?,
                max_retries: parse_or(&lookup, "FETCH_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                cooldown: secs_or(&lookup, "FETCH_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS)?,
                request_timeout: secs_or(
                    &lookup,
                    "FETCH_TIMEOUT_SECS",
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                )?,
                backoff_base: secs_or(
                    &lookup,
                    "FETCH_BACKOFF_BASE_SECS",
                    DEFAULT_BACKOFF_BASE_SECS,
                )?,
                timeout_delay: secs_or(
                    &lookup,
                    "FETCH_TIMEOUT_DELAY_SECS",
                    DEFAULT_TIMEOUT_DELAY_SECS,
                )?,
            },
            load: LoadConfig {
                schema: TableName::new(
                    non_empty(&lookup, "LOAD_SCHEMA").unwrap_or_else(|| DEFAULT_RAW_SCHEMA.to_string()),
                )
                .context("Invalid LOAD_SCHEMA")?,
                chunk_size: parse_or(&lookup, "LOAD_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            },
            schedule: ScheduleConfig {
                run_at: parse_run_at(
                    &non_empty(&lookup, "SCHEDULE_RUN_AT").unwrap_or_else(|| DEFAULT_RUN_AT.to_string()),
                )?,
                utc_offset: parse_utc_offset(
                    &non_empty(&lookup, "PIPELINE_UTC_OFFSET")
                        .unwrap_or_else(|| DEFAULT_UTC_OFFSET.to_string()),
                )?,
                check_interval: secs_or(
                    &lookup,
                    "SCHEDULE_CHECK_INTERVAL_SECS",
                    DEFAULT_CHECK_INTERVAL_SECS,
                )?,
            },
            datasets: load_datasets(&lookup)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://")) {
            anyhow::bail!(
                "DATAGOV_BASE_URL must be an http(s) URL, got '{}'",
                self.api.base_url
            );
        }

        if self.fetch.page_size == 0 {
            anyhow::bail!("FETCH_PAGE_SIZE must be greater than 0");
        }

        if self.fetch.max_retries == 0 {
            anyhow::bail!("FETCH_MAX_RETRIES must be greater than 0");
        }

        if self.fetch.request_timeout.is_zero() {
            anyhow::bail!("FETCH_TIMEOUT_SECS must be greater than 0");
        }

        if self.load.chunk_size == 0 || self.load.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "LOAD_CHUNK_SIZE must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE,
                self.load.chunk_size
            );
        }

        if self.schedule.check_interval.is_zero() {
            anyhow::bail!("SCHEDULE_CHECK_INTERVAL_SECS must be greater than 0");
        }

        self.database.validate()?;

        Ok(())
    }
}

impl DatabaseConfig {
    /// Load only the `DB_*` variables, for commands that never touch the API
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(&|key: &str| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            host: non_empty(lookup, "DB_HOST").unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
            port: parse_or(lookup, "DB_PORT", DEFAULT_DB_PORT)?,
            name: non_empty(lookup, "DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            user: non_empty(lookup, "DB_USER").unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("DB_PORT must be greater than 0");
        }
        if self.host.is_empty() || self.name.is_empty() || self.user.is_empty() {
            anyhow::bail!("DB_HOST, DB_NAME and DB_USER cannot be empty");
        }
        Ok(())
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user);

        if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl FetchPolicy {
    /// Wait before rate-limit retry number `retry` (1-based): base, 2x, 4x, ...
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            inter_request_delay: Duration::from_secs(DEFAULT_INTER_REQUEST_DELAY_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            backoff_base: Duration::from_secs(DEFAULT_BACKOFF_BASE_SECS),
            timeout_delay: Duration::from_secs(DEFAULT_TIMEOUT_DELAY_SECS),
        }
    }
}

fn load_datasets<F>(lookup: &F) -> Result<Vec<Dataset>>
where
    F: Fn(&str) -> Option<String>,
{
    DATASETS
        .iter()
        .map(|(key, label, var, table)| {
            let resource_id = non_empty(lookup, var)
                .with_context(|| format!("{} must be set", var))
                .and_then(|raw| {
                    ResourceId::new(raw).with_context(|| format!("Invalid {}", var))
                })?;

            Ok(Dataset {
                key: key.to_string(),
                label: label.to_string(),
                resource_id,
                table: TableName::new(*table)?,
            })
        })
        .collect()
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default_secs: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default_secs).map(Duration::from_secs)
}

fn parse_run_at(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .with_context(|| format!("Invalid SCHEDULE_RUN_AT '{}': expected HH:MM", value))
}
