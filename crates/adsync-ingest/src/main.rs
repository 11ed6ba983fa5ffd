//! adsync - marketing API to warehouse sync

use adsync_common::logging::{init_logging, LogConfig, LogLevel};
use adsync_ingest::api::GraphApiClient;
use adsync_ingest::config::SyncConfig;
use adsync_ingest::ledger::{AuditLedger, MemoryLedger, WarehouseLedger};
use adsync_ingest::orchestrator::{plan_accounts, Orchestrator};
use adsync_ingest::pacing::TokioPacer;
use adsync_ingest::warehouse::postgres::create_pool;
use adsync_ingest::warehouse::{MemoryWarehouse, PgWarehouse, Warehouse};
use adsync_ingest::window::WindowPlanner;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "adsync")]
#[command(author, version, about = "Incremental marketing API to warehouse sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run one sync pass over the configured accounts
    Run {
        /// Only sync these accounts (repeatable)
        #[arg(short, long = "account")]
        accounts: Vec<String>,

        /// Fetch for real but load into an in-memory warehouse
        #[arg(long)]
        dry_run: bool,
    },

    /// Show each account's last success and planned metric window
    Plan {
        /// Only plan these accounts (repeatable)
        #[arg(short, long = "account")]
        accounts: Vec<String>,
    },
}

/// Warehouse and ledger for the current invocation
async fn sinks(
    config: &SyncConfig,
    dry_run: bool,
) -> Result<(Arc<dyn Warehouse>, Arc<dyn AuditLedger>)> {
    if dry_run {
        warn!("Dry run: loads and audit records stay in memory");
        let warehouse: Arc<dyn Warehouse> = Arc::new(MemoryWarehouse::new(config.dataset.clone()));
        return Ok((warehouse, Arc::new(MemoryLedger::new())));
    }

    let database = config
        .database
        .as_ref()
        .context("DATABASE_URL is not set (use --dry-run to skip the warehouse)")?;
    let pool = create_pool(database)
        .await
        .context("Failed to connect to the warehouse")?;
    let warehouse: Arc<dyn Warehouse> =
        Arc::new(PgWarehouse::new(pool, config.dataset.clone(), config.audit_table.clone())?);
    let ledger: Arc<dyn AuditLedger> =
        Arc::new(WarehouseLedger::new(Arc::clone(&warehouse), config.audit_table.clone()));
    Ok((warehouse, ledger))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("adsync")
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    let config = SyncConfig::from_env().context("Invalid configuration")?;
    info!(?config, "Configuration loaded");

    match cli.command {
        Command::Run { accounts, dry_run } => {
            let accounts = config.select_accounts(&accounts)?;
            let api = Arc::new(GraphApiClient::new(config.graph_api()?)?);
            let (warehouse, ledger) = sinks(&config, dry_run).await?;

            let mut orchestrator =
                Orchestrator::new(&config, api, warehouse, ledger, Arc::new(TokioPacer));
            orchestrator
                .bootstrap()
                .await
                .context("Failed to bootstrap warehouse")?;

            let summary = orchestrator.run(&accounts).await;
            info!("{}", summary.summarize());
        },
        Command::Plan { accounts } => {
            let accounts = config.select_accounts(&accounts)?;
            let (_warehouse, ledger) = sinks(&config, false).await?;
            let planner = WindowPlanner::new(Utc::now().date_naive(), config.lookback_days);

            for planned in plan_accounts(ledger.as_ref(), &accounts, &planner).await {
                match planned {
                    Ok(p) => {
                        let last = p
                            .last_success
                            .map(|ts| ts.to_rfc3339())
                            .unwrap_or_else(|| "never".to_string());
                        if p.window.is_empty() {
                            info!(account = %p.account, last_success = %last, "Up to date, no metric fetch");
                        } else {
                            info!(
                                account = %p.account,
                                last_success = %last,
                                window = %p.window,
                                days = p.window.days(),
                                "Planned"
                            );
                        }
                    },
                    Err(e) => warn!(error = %e, "Cannot plan account"),
                }
            }
        },
    }

    Ok(())
}
