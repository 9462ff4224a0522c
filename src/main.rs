use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rent_scout::config::{LogFormat, RuntimeSettings, Settings, DEFAULT_CONFIG_PATH};
use rent_scout::health;
use rent_scout::notifier::ChannelNotifier;
use rent_scout::scrapers::HttpFetcher;
use rent_scout::store::SqliteStore;
use rent_scout::Pipeline;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const HEARTBEAT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "rent-scout", version, about = "Watch rental listings and alert on new matches")]
struct Cli {
    /// Config file (default: $CONFIG_FILE, then config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single scan and exit
    Run {
        /// Write the evaluated listings to this file as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Scan continuously
    Daemon {
        /// Log a heartbeat while waiting for the next scan
        #[arg(long)]
        log_sleep: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.clone()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("rent-scout: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings.runtime);

    let result = match cli.command.unwrap_or(Command::Run { out: None }) {
        Command::Run { out } => run(settings, out).await,
        Command::Daemon { log_sleep } => daemon(settings, log_sleep).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "fatal");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(cli_path: Option<PathBuf>) -> Result<Settings> {
    let path = cli_path
        .or_else(|| std::env::var_os("CONFIG_FILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let settings = Settings::load_from(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn init_tracing(runtime: &RuntimeSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&runtime.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match runtime.log_format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_pipeline(settings: Settings) -> Result<Pipeline> {
    let fetcher = HttpFetcher::new(settings.http.fetch_policy())?;
    let store = SqliteStore::open(&settings.runtime.state_db_path)?;
    let notifier = ChannelNotifier::from_settings(&settings.notify)?;
    Ok(Pipeline::new(
        settings,
        Arc::new(fetcher),
        Arc::new(store),
        Arc::new(notifier),
    ))
}

async fn run(settings: Settings, out: Option<PathBuf>) -> Result<ExitCode> {
    info!(city = %settings.search.city, areas = settings.search.areas.len(), "🏠 rent-scout started");
    let mut pipeline = build_pipeline(settings)?;
    let summary = pipeline.run_once().await;

    if let Some(path) = out {
        let json = serde_json::to_string_pretty(&summary.listings)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(count = summary.listings.len(), path = %path.display(), "💾 listings saved");
    }

    if summary.failed() {
        error!(targets = summary.targets_attempted, "one_shot_failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn daemon(settings: Settings, log_sleep: bool) -> Result<ExitCode> {
    let interval = settings.scan_interval();
    let health_port = settings.runtime.health_port;
    let mut pipeline = build_pipeline(settings)?;

    if let Some(port) = health_port {
        let status = pipeline.status();
        tokio::spawn(async move {
            if let Err(e) = health::serve(port, status).await {
                error!(error = ?e, "health_server_failed");
            }
        });
    }

    let mut shutdown = spawn_shutdown_listener();
    info!(interval_secs = interval.as_secs(), "🏠 rent-scout daemon started");

    loop {
        let started = Instant::now();
        pipeline.run_once().await;

        let wait = interval
            .saturating_sub(started.elapsed())
            .max(Duration::from_secs(1));
        if sleep_or_shutdown(wait, log_sleep, &mut shutdown).await {
            break;
        }
    }

    info!(totals = ?pipeline.totals(), "watchdog_stopped");
    Ok(ExitCode::SUCCESS)
}

/// Flips to `true` on SIGINT/SIGTERM (Ctrl-C elsewhere).
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => {
                info!("shutdown_signal_received");
                let _ = tx.send(true);
            }
            Err(e) => warn!(error = %e, "signal_handler_failed"),
        }
    });
    rx
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Wait out the gap between cycles. Returns `true` when a stop was requested.
async fn sleep_or_shutdown(
    wait: Duration,
    log_sleep: bool,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        if *shutdown.borrow() {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }

        let step = if log_sleep {
            info!(seconds_left = remaining.as_secs(), "sleeping_until_next_scan");
            remaining.min(HEARTBEAT)
        } else {
            remaining
        };

        tokio::select! {
            _ = tokio::time::sleep(step) => {}
            changed = shutdown.changed() => {
                // Listener gone without a signal; keep the schedule.
                if changed.is_err() {
                    tokio::time::sleep(step).await;
                }
            }
        }
    }
}
