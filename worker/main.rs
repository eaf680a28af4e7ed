#![forbid(unsafe_code)]

//! `jira-automation-worker`: task consumer binary.
//!
//! Consumes the work queue with prefetch 1 and runs the automation executor
//! for each task. Several worker processes may share one queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use jira_automation::config::WorkerConfig;
use jira_automation::queue::amqp::AmqpConnector;
use jira_automation::queue::{ChannelManager, QueueTopology, TaskConsumer, TaskHandler};
use jira_automation::telemetry::{init_tracing, shutdown_signal, LogFormat};
use jira_automation::worker::{AutomationHandler, DryRunExecutor};
use jira_automation::{AppError, Result};

#[derive(Debug, Parser)]
#[command(name = "jira-automation-worker", about = "Jira automation task worker", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Seconds to wait before resubscribing after the broker connection drops.
    #[arg(long, default_value_t = 5)]
    resubscribe_delay: u64,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("jira-automation worker bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = WorkerConfig::load_from_path(&args.config)?;
    config.load_broker_credentials().await?;
    info!(work_queue = %config.broker.work_queue, "configuration loaded");

    let channels = Arc::new(ChannelManager::new(Arc::new(AmqpConnector::new(
        config.broker.url.clone(),
    ))));
    let consumer = TaskConsumer::new(
        Arc::clone(&channels),
        QueueTopology::from_config(&config.broker),
    );
    let handler: Arc<dyn TaskHandler> =
        Arc::new(AutomationHandler::new(Arc::new(DryRunExecutor)));

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    // ── Consume until shutdown ──────────────────────────
    let delay = Duration::from_secs(args.resubscribe_delay);
    let result = loop {
        match consumer.run(&handler, &ct).await {
            Ok(()) => break Ok(()),
            Err(err) if err.is_connection_fault() => {
                warn!(%err, delay_secs = args.resubscribe_delay, "broker connection lost; resubscribing");
                tokio::select! {
                    () = ct.cancelled() => break Ok(()),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => {
                error!(%err, "task consumer failed");
                break Err(err);
            }
        }
    };

    channels.close().await;
    info!("jira-automation worker shut down");
    result
}
