use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use royaltybook::browser::BrowserSession;
use royaltybook::clock::{Clock, SystemClock};
use royaltybook::config::{default_config_path, ResolvedConfig};
use royaltybook::credentials::PortalCredentials;
use royaltybook::models::RunId;
use royaltybook::scrape::{ScrapeOrchestrator, ScrapeRun, ScrapeSettings};
use royaltybook::storage::{SqliteStorage, Storage};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str =
    "info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off";

#[derive(Parser)]
#[command(name = "royaltybook")]
#[command(about = "Royalty invoice scraper and ledger")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, scrape new invoices and store them
    Scrape {
        /// Process only the first new invoice
        #[arg(long)]
        debug: bool,

        /// Run the browser without a window (MFA cannot be completed)
        #[arg(long)]
        headless: bool,
    },

    /// Show recent scrape runs, or the log of one run
    Runs {
        /// Number of runs to list
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Print the log entries of this run instead
        #[arg(long, value_name = "RUN_ID")]
        logs: Option<i64>,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    match cli.command {
        Command::Scrape { debug, headless } => scrape(config, debug, headless).await,
        Command::Runs { limit, logs } => {
            let storage = SqliteStorage::open(&config.database_path)?;
            match logs {
                Some(run_id) => print_logs(&storage, RunId::new(run_id)).await?,
                None => print_runs(&storage, limit).await?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            println!("Config file: {}", config_path.display());
            println!("Data directory: {}", config.data_dir.display());
            println!("Database: {}", config.database_path.display());
            println!("Browser profile: {}", config.profile_dir.display());
            println!("Portal: {}", config.portal.base_url);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn scrape(mut config: ResolvedConfig, debug: bool, headless: bool) -> Result<ExitCode> {
    if headless {
        config.browser.headless = true;
    }

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&config.database_path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let run = ScrapeRun::start(storage.clone(), clock.clone(), debug).await?;

    let setup = async {
        let credentials = PortalCredentials::load(config.credentials.build().as_ref())
            .await
            .context("Failed to load portal credentials")?;
        run.log().info("Launching browser").await;
        let session = BrowserSession::launch(&config.browser, &config.profile_dir)
            .await
            .context("Failed to launch browser")?;
        anyhow::Ok((credentials, session))
    }
    .await;
    let (credentials, session) = match setup {
        Ok(ready) => ready,
        Err(e) => {
            let summary = run.abort(e).await?;
            println!("{}", summary.message());
            return Ok(ExitCode::from(summary.outcome.exit_code()));
        }
    };

    let orchestrator = ScrapeOrchestrator::new(
        session.driver(),
        storage,
        ScrapeSettings::from_config(&config, debug),
        credentials,
    )
    .with_clock(clock);

    let result = orchestrator
        .run_in(run, async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Err(e) = session.close().await {
        tracing::warn!("Failed to close browser cleanly: {e:#}");
    }

    let summary = result?;
    println!("{}", summary.message());
    Ok(ExitCode::from(summary.outcome.exit_code()))
}

async fn print_runs(storage: &dyn Storage, limit: usize) -> Result<()> {
    let runs = storage.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No scrape runs recorded.");
        return Ok(());
    }

    for run in runs {
        let finished = run
            .finished_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{:<5} {}  {}  {:<13} processed={} skipped={}{}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            finished,
            run.status.as_str(),
            run.invoices_processed,
            run.invoices_skipped,
            run.error_message
                .map(|e| format!("  error: {e}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn print_logs(storage: &dyn Storage, run_id: RunId) -> Result<()> {
    let run = storage
        .get_run(run_id)
        .await?
        .with_context(|| format!("No scrape run {run_id}"))?;
    println!("Run #{} ({})", run.id, run.status);
    for entry in storage.list_logs(run_id).await? {
        println!(
            "{} [{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.level,
            entry.message
        );
    }
    Ok(())
}
