//! SG Cost of Living - ETL pipeline

use anyhow::Result;
use chrono::FixedOffset;
use clap::{Parser, Subcommand};
use sgcol_common::format::group_thousands;
use sgcol_common::logging::{init_logging, LogConfig, LogLevel};
use sgcol_common::types::parse_utc_offset;
use sgcol_common::BatchId;
use sgcol_pipeline::clock::TokioSleeper;
use sgcol_pipeline::config::{Config, DatabaseConfig, DEFAULT_UTC_OFFSET};
use sgcol_pipeline::db;
use sgcol_pipeline::load::{MemoryRawStore, PgRawStore, RawStore};
use sgcol_pipeline::orchestrator::{Orchestrator, RunSummary};
use sgcol_pipeline::scheduler::{DailySchedule, Scheduler};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sgcol-pipeline")]
#[command(author, version, about = "Singapore cost-of-living raw data pipeline")]
struct Cli {
    /// What to run (default: schedule)
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline every day at SCHEDULE_RUN_AT
    Schedule,

    /// Run the pipeline once and exit
    RunOnce {
        /// Fetch everything but keep rows in memory instead of the database
        #[arg(long)]
        dry_run: bool,

        /// Batch id to tag rows with (default: derived from the start time)
        #[arg(long)]
        batch_id: Option<String>,
    },

    /// Test the database connection and exit
    CheckDb,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("pipeline")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_lookup(log_config, |key| std::env::var(key).ok())?;

    let _guard = init_logging(&log_config)?;

    info!("{}", "=".repeat(50));
    info!("SG Cost of Living - ETL Pipeline");
    info!("{}", "=".repeat(50));

    match cli.command.unwrap_or(Command::Schedule) {
        Command::Schedule => schedule().await,
        Command::RunOnce { dry_run, batch_id } => run_once(dry_run, batch_id).await,
        Command::CheckDb => check_db().await,
    }
}

async fn schedule() -> Result<()> {
    let config = Config::load()?;
    db::test_connection(&config.database, config.schedule.utc_offset).await?;

    let store = Arc::new(PgRawStore::from_config(&config.database));
    let orchestrator = Orchestrator::from_config(&config, store)?;
    let scheduler = Scheduler::new(
        orchestrator,
        DailySchedule::from_config(&config.schedule),
        config.schedule.check_interval,
        Arc::new(TokioSleeper),
    );

    info!("Waiting for next scheduled run...");
    scheduler.run_forever().await;

    Ok(())
}

async fn run_once(dry_run: bool, batch_id: Option<String>) -> Result<()> {
    let config = Config::load()?;
    info!("Manual pipeline run");

    let store: Arc<dyn RawStore> = if dry_run {
        info!("Dry run: rows are kept in memory and discarded");
        Arc::new(MemoryRawStore::new())
    } else {
        db::test_connection(&config.database, config.schedule.utc_offset).await?;
        Arc::new(PgRawStore::from_config(&config.database))
    };

    let orchestrator = Orchestrator::from_config(&config, store)?;
    for dataset in orchestrator.datasets() {
        info!(dataset = %dataset.key, resource_id = %dataset.resource_id, table = %dataset.table, "Configured dataset: {}", dataset.label);
    }

    let summary = match batch_id {
        Some(id) => orchestrator.run_with_batch(BatchId::new(id)).await?,
        None => orchestrator.run().await?,
    };

    report(&summary);
    Ok(())
}

async fn check_db() -> Result<()> {
    let database = DatabaseConfig::load()?;
    let offset = pipeline_offset()?;

    let now = db::test_connection(&database, offset).await?;
    info!("Database OK ({})", now.format("%Y-%m-%d %H:%M:%S %:z"));

    Ok(())
}

fn pipeline_offset() -> Result<FixedOffset> {
    let raw = std::env::var("PIPELINE_UTC_OFFSET")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UTC_OFFSET.to_string());
    Ok(parse_utc_offset(&raw)?)
}

fn report(summary: &RunSummary) {
    info!(
        batch_id = %summary.batch_id,
        "Pipeline run complete: {} rows in {:.2}s",
        group_thousands(summary.total_loaded()),
        summary.elapsed.as_secs_f64()
    );
}
