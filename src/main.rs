use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use issue_tracker::aggregate::MonthKey;
use issue_tracker::attachments::LocalAttachmentStore;
use issue_tracker::config::AppConfig;
use issue_tracker::db::{now, Database};
use issue_tracker::http::{router, HttpSettings};
use issue_tracker::logging::{init_logging, OperationTimer};
use issue_tracker::scheduler::spawn_monthly_rollup;
use issue_tracker::service::{PageLimits, TrackerService};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind, overrides server.bind_address
        #[arg(short, long, env = "ISSUE_TRACKER_BIND")]
        bind: Option<String>,
    },
    /// Recompute and store one month's summary
    ProcessSummary {
        /// Month to process (YYYY-MM), defaults to the previous month
        #[arg(short, long)]
        month: Option<String>,
    },
    /// Recompute and store one year's summary
    ProcessAnnual {
        /// Year to process, defaults to the current year
        #[arg(short, long)]
        year: Option<i32>,
    },
    /// Print issue counts by status
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging; the guard flushes the file writer on exit
    let _log_guard = init_logging(
        Some(&config.logging.level),
        config.logging.file_path.as_deref().map(Path::new),
        &config.logging.format,
    )?;

    info!("Starting issue-tracker");

    // Initialize database with configuration
    let db = Database::with_pool_settings(
        &config.database.url,
        config.database.max_connections,
        Duration::from_secs(config.database.connection_timeout_secs),
    )
    .context("Failed to open database")?;

    let store = LocalAttachmentStore::new(&config.uploads.directory, config.max_upload_bytes())
        .context("Failed to open upload directory")?;

    let service = TrackerService::new(
        db,
        Arc::new(store),
        PageLimits {
            default_limit: config.server.default_page_size,
            max_limit: config.server.max_page_size,
        },
    );

    // Process command
    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => serve(&config, service, bind).await?,
        Commands::ProcessSummary { month } => {
            let month = month.as_deref().map(MonthKey::parse).transpose()?;
            let timer = OperationTimer::new("process_summary");
            let record = service.process_monthly(month).await?;
            timer.finish();
            print_json(&issue_tracker::summary::ProcessOutcome::from(record))?;
        }
        Commands::ProcessAnnual { year } => {
            let year = year.unwrap_or_else(|| now().year());
            let record = service.process_annual(year).await?;
            print_json(&issue_tracker::summary::ProcessOutcome::from(record))?;
        }
        Commands::Stats => {
            let stats = service.issue_stats().await?;
            print_json(&stats)?;
        }
    }

    Ok(())
}

/// Serve HTTP until ctrl-c, running the monthly rollup alongside when enabled
async fn serve(config: &AppConfig, service: TrackerService, bind: Option<String>) -> Result<()> {
    let address = bind.unwrap_or_else(|| config.server.bind_address.clone());

    let rollup = config
        .scheduler
        .monthly_rollup_enabled
        .then(|| spawn_monthly_rollup(service.clone()));

    let app = router(
        service,
        HttpSettings {
            expose_error_details: config.server.expose_error_details,
            max_upload_bytes: config.max_upload_bytes(),
        },
    );

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(%address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = rollup {
        handle.abort();
    }
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[allow(clippy::print_stdout)]
fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
