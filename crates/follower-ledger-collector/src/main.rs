//! Follower Ledger collector: entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use follower_ledger::{CycleConfig, CycleController, FollowerExtractor, Shutdown};
use follower_ledger_collector::config::{load_targets, resolve_storage, StorageTarget};
use follower_ledger_collector::renderer::chromium::ChromiumPage;
use follower_ledger_collector::renderer::BrowserOptions;
use follower_ledger_collector::{doctor, show};

#[derive(Parser)]
#[command(
    name = "follower-ledger",
    about = "Follower Ledger: periodic follower counts saved as partitioned Parquet",
    version,
    after_help = "Without a subcommand the collector runs until interrupted (Ctrl-C)."
)]
struct Cli {
    /// Text file with one @handle/username per line.
    #[arg(long)]
    handles_file: Option<PathBuf>,

    /// Pause after finishing the whole list, in seconds.
    #[arg(long, default_value = "20")]
    sleep_between_cycles: u64,

    /// Run the browser without a window.
    #[arg(long)]
    headless: bool,

    /// Persistent Chromium profile directory (cookies/session).
    #[arg(long, default_value = "user_data")]
    profile_dir: PathBuf,

    /// Minimum wait after each page load before reading the counter, in seconds.
    #[arg(long, default_value = "10")]
    settle_secs: u64,

    /// Navigation timeout, in seconds.
    #[arg(long, default_value = "30")]
    navigation_timeout_secs: u64,

    /// Output directory for local Parquet files (env FOLLOWER_LEDGER_OUT_DIR).
    #[arg(long, global = true)]
    out_dir: Option<String>,

    /// Write to this S3 bucket instead of the local directory (env FOLLOWER_LEDGER_S3_BUCKET).
    #[arg(long, global = true)]
    s3_bucket: Option<String>,

    /// Key prefix inside the bucket (env FOLLOWER_LEDGER_S3_PREFIX, default "data").
    #[arg(long, global = true)]
    s3_prefix: Option<String>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one stored partition as JSON lines.
    Show {
        /// Profile id (without @).
        #[arg(long)]
        profile: String,
        /// UTC day, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Check Chromium and storage availability.
    Doctor,
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let target = resolve_storage(
        cli.out_dir.as_deref(),
        cli.s3_bucket.as_deref(),
        cli.s3_prefix.as_deref(),
    );

    let result = match &cli.command {
        None => collect(&cli, &target).await,
        Some(Commands::Show { profile, date }) => show_partition(&target, profile, *date).await,
        Some(Commands::Doctor) => match doctor::run(&target).await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(1),
            Err(e) => Err(e),
        },
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    result
}

async fn show_partition(target: &StorageTarget, profile: &str, date: Option<NaiveDate>) -> Result<()> {
    let store = target.open()?;
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let mut stdout = std::io::stdout().lock();
    show::write_partition(&store, profile, date, &mut stdout).await?;
    Ok(())
}

async fn collect(cli: &Cli, target: &StorageTarget) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        cwd = %std::env::current_dir().map(|p| p.display().to_string()).unwrap_or_default(),
        "follower-ledger collector starting"
    );

    let handles_file = cli
        .handles_file
        .as_ref()
        .context("--handles-file is required to run the collector")?;
    let targets = load_targets(handles_file)?;
    info!(count = targets.len(), profiles = %targets.join(", "), "profiles loaded");

    let store = target.open()?;

    let config = CycleConfig {
        settle_wait: Duration::from_secs(cli.settle_secs),
        navigation_timeout: Duration::from_secs(cli.navigation_timeout_secs),
        cycle_pause: Duration::from_secs(cli.sleep_between_cycles),
        ..CycleConfig::default()
    };
    info!(
        storage = %target,
        headless = cli.headless,
        cycle_pause_secs = cli.sleep_between_cycles,
        settle_secs = cli.settle_secs,
        "collector configured"
    );
    if !cli.headless {
        info!("if a verification page appears, solve it in the browser window; the session is kept in the profile directory");
    }

    let options = BrowserOptions {
        headless: cli.headless,
        profile_dir: cli.profile_dir.clone(),
        executable: None,
    };
    let page = ChromiumPage::launch(&options).await?;

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            signal.trigger();
        }
    });

    let controller = CycleController::new(
        page,
        store,
        FollowerExtractor::default(),
        targets,
        config,
        shutdown,
    );
    let passes = controller.run().await;
    info!(passes, "collector stopped");
    Ok(())
}
