//! HTTP ingress: webhook receiver and health check.

pub mod response;
pub mod txn;
pub mod webhook;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::jira::IssueTracker;
use crate::queue::TaskPublisher;
use crate::trigger::TriggerEngine;
use crate::{AppError, Result};

pub use response::{ApiError, ApiResponse};
pub use webhook::{process_webhook, WebhookOutcome};

/// Shared state for request handlers.
pub struct AppState {
    /// Decides which events start automation.
    pub engine: TriggerEngine,
    /// Source of enriched issue detail.
    pub tracker: Arc<dyn IssueTracker>,
    /// Publishes triggered tasks to the work queue.
    pub publisher: Arc<TaskPublisher>,
}

async fn health() -> ApiResponse {
    ApiResponse::success("Service is healthy", json!({ "status": "ok" }))
}

/// Build the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/jira", post(webhook::handle_webhook))
        .layer(middleware::from_fn(txn::txn_id_middleware))
        .with_state(state)
}

/// Serve on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails while running.
pub async fn serve(listener: TcpListener, state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("listener has no local address: {err}")))?;
    info!(%addr, "starting webhook listener");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("http server error: {err}")))?;

    info!("webhook listener shut down");
    Ok(())
}
