//! oncall CLI.
//!
//! - `oncall daemon` answers chat mentions and escalates incidents
//! - `oncall sync` copies the duty roster into chat user groups once

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use notify::{Notifier, SlackClient, SocketModeSource};
use paging::{IncidentBackend, OpsgenieClient};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use oncall::config::{Config, DEFAULT_CONFIG_FILE, DEFAULT_CONFIG_PATH};
use oncall::telemetry::{self, LogFormat, LogLevel};
use oncall::{
    ChatRenderer, DutyRoster, EngineSettings, EscalationEngine, EventDispatcher, GroupSync,
    Renderer,
};

/// Page the engineer on duty from chat and escalate unanswered incidents.
#[derive(Parser)]
#[command(name = "oncall")]
#[command(about = "Integrates the Opsgenie duty roster with Slack")]
#[command(version)]
struct Cli {
    /// Directory of the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config_path: PathBuf,

    /// Name of the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,

    /// Log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer chat mentions until SIGINT or SIGTERM
    Daemon,

    /// Update chat user groups from the duty roster and exit
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init(cli.log_level, cli.log_format);

    let path = Config::path(&cli.config_path, &cli.config_file);
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!(config = %path.display(), "Configuration loaded");

    match cli.command {
        Commands::Daemon => daemon(config).await,
        Commands::Sync => sync(config).await,
    }
}

async fn daemon(config: Config) -> Result<()> {
    config.validate_daemon().context("Invalid configuration")?;

    let backend: Arc<dyn IncidentBackend> = Arc::new(
        OpsgenieClient::new(config.opsgenie_client()).context("Failed to build Opsgenie client")?,
    );
    let renderer = Renderer::new(
        config.messages.clone(),
        config.opsgenie.priority_increase.confirm,
    );
    let ladder = config.opsgenie.priority_increase.ladder();

    let shutdown = CancellationToken::new();
    let mut dispatchers = Vec::with_capacity(config.schedules.len());

    for schedule in &config.schedules {
        let slack = SlackClient::new(&schedule.slack.bot_token).with_app_token(&schedule.slack.app_token);
        let bot_user = slack
            .auth_test()
            .await
            .with_context(|| format!("Slack authentication failed for group {}", schedule.group))?;

        let notifier: Arc<dyn Notifier> = Arc::new(slack.clone());
        let roster = DutyRoster::new(Arc::clone(&backend), Arc::clone(&notifier));
        let engine = EscalationEngine::new(
            EngineSettings {
                group: schedule.group.clone(),
                schedule: schedule.schedule.clone(),
                default_priority: config.opsgenie.priority,
                ladder,
            },
            Arc::clone(&backend),
            roster,
        );
        let chat = Arc::new(ChatRenderer::new(Arc::clone(&notifier), renderer.clone()));

        let dispatcher = EventDispatcher::new(SocketModeSource::new(slack), engine, notifier, chat);
        let span = info_span!("dispatcher", group = %schedule.group, schedule = %schedule.schedule);

        info!(group = %schedule.group, schedule = %schedule.schedule, bot_user = %bot_user, "Starting dispatcher");
        dispatchers.push(tokio::spawn(
            dispatcher.run(shutdown.child_token()).instrument(span),
        ));
    }

    shutdown_signal().await;
    shutdown.cancel();

    for result in join_all(dispatchers).await {
        if let Err(e) = result {
            error!(error = %e, "Dispatcher task failed");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn sync(config: Config) -> Result<()> {
    config.validate_sync().context("Invalid configuration")?;
    let targets = config.sync.targets()?;

    let backend = Arc::new(
        OpsgenieClient::new(config.opsgenie_client()).context("Failed to build Opsgenie client")?,
    );
    let slack = Arc::new(SlackClient::new(&config.sync.slack_token));

    let roster = DutyRoster::new(backend, slack.clone());
    let report = GroupSync::new(roster, slack).run(&targets).await;

    info!(
        updated = report.updated.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Sync finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
