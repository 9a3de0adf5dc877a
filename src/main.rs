use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use scout_runtime::{ConfiguredSession, OfflineSite, Orchestrator, SearchQuery};
use scout_settings::ScoutSettings;
use scout_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Login, forwarding, realtime chat, commands and chat monitoring.
    Full,
    /// Search candidates once and print them as JSON.
    Search,
    /// Same services as `full`, announced as a monitoring session.
    Monitor,
    /// Exercise login, search, realtime and control-plane connectivity once.
    Test,
}

#[derive(Debug, Parser)]
#[command(name = "scout", version, about = "Recruitment-site relay agent")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Mode::Full)]
    mode: Mode,
    /// Run the browser collaborator without a window.
    #[arg(long)]
    headless: bool,
    /// Settings file (defaults to ~/.scout/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    keyword: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long, default_value_t = 20)]
    max_candidates: usize,
    /// Overrides the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => scout_settings::load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => scout_settings::load_settings().context("loading settings")?,
    };
    if cli.headless {
        settings.site.headless = true;
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: TelemetryConfig::parse_level(&settings.logging.level),
        json: settings.logging.json,
        log_db_path: settings.logging.db_path.as_ref().map(PathBuf::from),
        retention_days: settings.logging.retention_days,
        ..Default::default()
    });

    tracing::info!(mode = ?cli.mode, headless = settings.site.headless, "starting scout");

    let orchestrator = Arc::new(build_orchestrator(&settings));
    spawn_signal_watcher(Arc::clone(&orchestrator));

    let outcome = match cli.mode {
        Mode::Full | Mode::Monitor => orchestrator.run().await.map_err(anyhow::Error::from),
        Mode::Search => search(&orchestrator, &cli).await,
        Mode::Test => self_test(&orchestrator).await,
    };
    orchestrator.stop().await;

    if let Err(e) = &outcome {
        tracing::error!(error = %e, "scout exited with an error");
    }
    outcome
}

fn build_orchestrator(settings: &ScoutSettings) -> Orchestrator {
    let session = ConfiguredSession::new(settings.site.username.clone(), settings.realtime.cookie.clone());
    Orchestrator::initialize(settings, Arc::new(session), Arc::new(OfflineSite::default()))
}

/// Stop the orchestrator on Ctrl+C or SIGTERM. Repeated signals are harmless.
fn spawn_signal_watcher(orchestrator: Arc<Orchestrator>) {
    drop(tokio::spawn(async move {
        loop {
            if let Err(e) = shutdown_signal().await {
                tracing::warn!(error = %e, "failed to listen for shutdown signals");
                return;
            }
            tracing::info!("shutdown signal received");
            orchestrator.stop().await;
        }
    }));
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

async fn search(orchestrator: &Orchestrator, cli: &Cli) -> anyhow::Result<()> {
    orchestrator.login().await?;
    let query = SearchQuery {
        keyword: cli.keyword.clone().unwrap_or_else(|| "Python开发".to_string()),
        location: cli.location.clone().unwrap_or_else(|| "北京".to_string()),
        ..Default::default()
    };
    let mut candidates = orchestrator
        .search_candidates(&query)
        .await
        .context("candidate search")?;
    candidates.truncate(cli.max_candidates);
    tracing::info!(found = candidates.len(), keyword = %query.keyword, "search finished");
    println!("{}", serde_json::to_string_pretty(&candidates)?);
    Ok(())
}

async fn self_test(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    orchestrator.login().await?;
    tracing::info!("login check passed");

    let sample = SearchQuery {
        keyword: "测试".to_string(),
        page_limit: 1,
        ..Default::default()
    };
    match orchestrator.search_candidates(&sample).await {
        Ok(found) => tracing::info!(found = found.len(), "search check passed"),
        Err(e) => tracing::error!(error = %e, "search check failed"),
    }

    if orchestrator.start_realtime().await {
        tracing::info!("realtime check passed");
    } else {
        tracing::warn!("realtime check failed");
    }

    let _ = orchestrator.start_forwarding().await;
    if orchestrator.test_control_plane().await {
        tracing::info!("control plane check passed");
    } else {
        tracing::warn!("control plane check failed (server may be unconfigured)");
    }

    tracing::info!(status = %serde_json::to_string(&orchestrator.status())?, "self test finished");
    Ok(())
}
