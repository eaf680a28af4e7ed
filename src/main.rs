#![forbid(unsafe_code)]

//! `jira-automation`: webhook receiver binary.
//!
//! Bootstraps configuration, connects lazily to the broker, and serves the
//! Jira webhook endpoint until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use jira_automation::config::GlobalConfig;
use jira_automation::http::{self, AppState};
use jira_automation::jira::JiraClient;
use jira_automation::queue::amqp::AmqpConnector;
use jira_automation::queue::{ChannelManager, QueueTopology, TaskPublisher};
use jira_automation::telemetry::{init_tracing, shutdown_signal, LogFormat};
use jira_automation::trigger::TriggerEngine;
use jira_automation::{AppError, Result};

#[derive(Debug, Parser)]
#[command(name = "jira-automation", about = "Jira webhook trigger service", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP port from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("jira-automation server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.load_broker_credentials().await?;
    config.load_jira_credentials().await?;
    info!(
        work_queue = %config.broker.work_queue,
        dead_letter_queue = %config.broker.dead_letter_queue,
        trigger_label = %config.trigger_label,
        "configuration loaded"
    );

    // ── Build shared state ──────────────────────────────
    let channels = Arc::new(ChannelManager::new(Arc::new(AmqpConnector::new(
        config.broker.url.clone(),
    ))));
    let publisher = Arc::new(TaskPublisher::new(
        Arc::clone(&channels),
        QueueTopology::from_config(&config.broker),
    ));
    let state = Arc::new(AppState {
        engine: TriggerEngine::new(config.trigger_label.clone()),
        tracker: Arc::new(JiraClient::new(&config.jira, config.repository_field.clone())),
        publisher,
    });

    // ── Start listener ──────────────────────────────────
    let bind = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {bind}: {err}")))?;

    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(listener, state, server_ct).await {
            error!(%err, "webhook listener failed");
        }
    });

    info!(%bind, "jira-automation ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = server_handle.await;
    channels.close().await;
    info!("jira-automation shut down");

    Ok(())
}
