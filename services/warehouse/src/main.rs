//! Warehouse Service - Loads staged revenue and movie metadata into the star schema
//!
//! Responsibilities:
//! - Read the daily revenue CSV and the captured metadata payloads
//! - Replace both staging relations
//! - Run the dimension, fact and bridge loads in dependency order
//! - Record the run and its step outcomes in `etl_runs`
//!
//! Usage:
//!   cargo run --bin warehouse -- --revenues data/revenues_per_day.csv --payloads data/raw

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use warehouse::staging::{read_payload_dir, read_revenue_csv};
use warehouse::{Pipeline, PipelineInput, RunPolicy, Store, StepOutcome};

#[derive(Parser, Debug)]
#[command(name = "warehouse", about = "Loads movie revenue data into the star schema")]
struct Args {
    /// SQLite warehouse file
    #[arg(long, env = "DB_PATH", default_value = "./data/movies.db")]
    db: PathBuf,

    /// Daily revenue CSV (id,date,title,revenue,theaters,distributor)
    #[arg(long, env = "REVENUES_CSV", default_value = "./data/revenues_per_day.csv")]
    revenues: PathBuf,

    /// Directory of metadata payloads captured by the collector
    #[arg(long, env = "RAW_FS_DIR", default_value = "./data/raw")]
    payloads: PathBuf,

    /// Stop at the first failed step instead of continuing with independent ones
    #[arg(long, default_value = "false")]
    halt_on_error: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== Movie Revenue Warehouse ===");
    info!("Warehouse: {}", args.db.display());
    info!("Revenues: {}", args.revenues.display());
    info!("Payloads: {}", args.payloads.display());

    let revenues = read_revenue_csv(&args.revenues)
        .await
        .context("Failed to read revenue CSV")?;

    let payloads = if args.payloads.is_dir() {
        read_payload_dir(&args.payloads)
            .await
            .context("Failed to read metadata payloads")?
    } else {
        warn!("Payload directory {} not found; staging no metadata", args.payloads.display());
        Vec::new()
    };

    let store = Store::open(&args.db)
        .await
        .context("Failed to open warehouse")?;

    let policy = if args.halt_on_error {
        RunPolicy::Halt
    } else {
        RunPolicy::Continue
    };

    let input = PipelineInput { revenues, payloads };
    let report = Pipeline::new(&store, policy).run(&input).await;
    store.close().await;

    info!("=== Run Summary ===");
    for step in &report.steps {
        match &step.outcome {
            StepOutcome::Loaded(counts) => info!(
                "  {:<24} loaded   +{} (present {}, unresolved {})",
                step.step.name(),
                counts.inserted,
                counts.skipped,
                counts.unresolved
            ),
            StepOutcome::Skipped { reason } => {
                info!("  {:<24} skipped  {}", step.step.name(), reason)
            }
            StepOutcome::Failed { reason } => {
                error!("  {:<24} FAILED   {}", step.step.name(), reason)
            }
        }
    }

    if !report.succeeded() {
        anyhow::bail!("Warehouse run finished with failed steps");
    }
    Ok(())
}
