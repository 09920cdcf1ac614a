//! Octoprompt daemon: loads the config, starts the scheduler engine and
//! the HTTP control API, and supervises wake recovery and signal-driven
//! reloads until shutdown.

use chrono::{Local, Utc};
use clap::Parser;
use octoprompt_core::{AppConfig, ConfigHandle};
use octoprompt_gateway::{GatewayState, HttpServer};
use octoprompt_scheduler::{
    CliBackend, DesktopNotifier, EventSink, SchedulerEngine, SlackNotifier, StateStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Fallback assistant CLI binary name, resolved via $PATH.
const DEFAULT_ASSISTANT_CLI: &str = "claude";

/// Wake watcher cadence and the wall-clock jump that counts as a suspend.
const WAKE_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const WAKE_JUMP_THRESHOLD_SECS: i64 = 90;

#[derive(Parser)]
#[command(name = "octoprompt", version, about = "Fires scheduled prompts at an AI assistant")]
struct Cli {
    /// Config file path (default: ~/.octoprompt/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the control API port
    #[arg(short, long)]
    port: Option<u16>,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool, log_directory: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    if let Some(dir) = log_directory {
        if std::fs::create_dir_all(dir).is_ok() {
            let file_name = format!("octoprompt-{}.log", Local::now().format("%Y-%m-%d"));
            if let Ok(file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(file_name))
            {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .init();
                return;
            }
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);

    // Peek at the config before the subscriber exists so log output can go
    // to the configured directory from the first line.
    let log_directory = AppConfig::load_from(&config_path)
        .ok()
        .and_then(|c| c.global_options.log_directory)
        .map(|dir| PathBuf::from(shellexpand::tilde(&dir).into_owned()));
    init_logging(cli.verbose, log_directory.as_deref());
    tracing::info!("🐙 Octoprompt v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ConfigHandle::load(config_path));
    let snapshot = config.snapshot();

    let assistant_cli = snapshot
        .global_options
        .assistant_cli_path
        .clone()
        .unwrap_or_else(|| DEFAULT_ASSISTANT_CLI.to_string());
    let backend = Arc::new(CliBackend::new(&assistant_cli));
    let notifier = Arc::new(DesktopNotifier::new(snapshot.global_options.show_notifications));
    let slack = Arc::new(SlackNotifier::from_config(snapshot.slack.as_ref()));
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::clone(&slack) as Arc<dyn EventSink>];

    let engine = Arc::new(SchedulerEngine::new(
        Arc::clone(&config),
        backend,
        notifier,
        sinks,
        StateStore::new(&AppConfig::home_dir()),
    ));
    engine.start();
    // Catch up on anything missed while the daemon was down.
    engine.check_missed_fires().await;

    let http = snapshot.http.clone().unwrap_or_default();
    if http.enabled {
        let port = cli.port.unwrap_or(http.port);
        let state = GatewayState::new(Arc::clone(&config), Arc::clone(&engine), Arc::clone(&slack));
        match HttpServer::bind(state, &http.host, port).await {
            Ok(server) => {
                tokio::spawn(server.serve());
            }
            Err(e) => {
                tracing::error!("❌ Failed to bind HTTP server on {}:{port}: {e}", http.host)
            }
        }
    }

    spawn_wake_watcher(Arc::clone(&engine));
    #[cfg(unix)]
    spawn_reload_handler(Arc::clone(&config), Arc::clone(&engine));

    tokio::signal::ctrl_c().await?;
    tracing::info!("👋 Shutting down");
    engine.stop();
    Ok(())
}

/// Timers armed with monotonic deadlines do not fire while the host is
/// suspended. Watch for wall-clock jumps and run missed-fire recovery
/// after each one.
fn spawn_wake_watcher(engine: Arc<SchedulerEngine>) {
    tokio::spawn(async move {
        let mut last_tick = Utc::now();
        loop {
            tokio::time::sleep(WAKE_CHECK_INTERVAL).await;
            let now = Utc::now();
            let gap = (now - last_tick).num_seconds();
            if gap > WAKE_JUMP_THRESHOLD_SECS {
                tracing::info!("💤 Wake detected after {gap}s gap — checking for missed fires");
                engine.check_missed_fires().await;
            }
            last_tick = now;
        }
    });
}

/// SIGHUP re-reads the config file and rebuilds the timer set.
#[cfg(unix)]
fn spawn_reload_handler(config: Arc<ConfigHandle>, engine: Arc<SchedulerEngine>) {
    tokio::spawn(async move {
        let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!("⚠️ Failed to install SIGHUP handler: {e}");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            if let Err(e) = config.reload() {
                tracing::warn!("⚠️ Config reload failed: {e}");
            }
            engine.restart();
        }
    });
}
