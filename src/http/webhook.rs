//! `POST /api/webhooks/jira`: decide, enrich, enqueue.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::to_value;
use tracing::{info, info_span, Instrument};

use super::response::{ApiError, ApiResponse};
use super::txn::TxnId;
use super::AppState;
use crate::models::event::{FieldChange, WebhookEvent, WebhookPayload};
use crate::models::task::Task;
use crate::trigger::relevant_changes;
use crate::{AppError, Result};

/// Body of `data` in the webhook response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    /// Whether a task was enqueued.
    pub processed: bool,
    /// Trigger decision reason.
    pub reason: String,
    /// Issue the webhook was about.
    pub issue_key: String,
    /// Work queue the task went to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Relevant changelog entries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
}

/// Axum handler for Jira webhooks.
///
/// # Errors
///
/// Responds 400 when the body is not a webhook payload, 500 when fetching
/// issue detail or publishing fails.
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Extension(TxnId(txn_id)): Extension<TxnId>,
    payload: std::result::Result<Json<WebhookPayload>, JsonRejection>,
) -> std::result::Result<ApiResponse, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::new(AppError::Validation(rejection.body_text()), txn_id.clone())
    })?;

    if payload.issue.key.trim().is_empty() {
        return Err(ApiError::new(
            AppError::Validation("issue.key must not be empty".into()),
            txn_id,
        ));
    }

    info!(
        event = %payload.webhook_event,
        issue_key = %payload.issue.key,
        "received jira webhook"
    );

    let outcome = process_webhook(&state, WebhookEvent::from(payload), &txn_id)
        .await
        .map_err(|err| ApiError::new(err, txn_id.clone()))?;

    let data = to_value(&outcome)
        .map_err(|err| ApiError::new(AppError::Io(err.to_string()), txn_id.clone()))?;
    Ok(ApiResponse::success("Webhook received", data))
}

/// Run one normalized event through the trigger engine and, when it fires,
/// fetch issue detail and publish a task.
///
/// # Errors
///
/// Returns `AppError::Tracker` when issue detail cannot be fetched, or
/// `AppError::Publish`/`AppError::Connection` when the task cannot be queued.
pub async fn process_webhook(
    state: &AppState,
    event: WebhookEvent,
    txn_id: &str,
) -> Result<WebhookOutcome> {
    let span = info_span!("process_webhook", txn_id, issue_key = %event.issue.key);
    async move {
        let changes = event
            .changelog
            .as_deref()
            .map(relevant_changes)
            .unwrap_or_default();

        let decision = state.engine.decide(&event);
        if !decision.triggered {
            info!(reason = %decision.reason, "event did not trigger automation");
            return Ok(WebhookOutcome {
                processed: false,
                reason: decision.reason,
                issue_key: event.issue.key,
                queue: None,
                changes,
            });
        }

        info!(reason = %decision.reason, "automation triggered");
        let snapshot = state.tracker.get_issue(&event.issue.key, txn_id).await?;
        let timestamp = event
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let task = Task::new(snapshot, timestamp, txn_id);
        let receipt = state.publisher.publish(&task, txn_id).await?;

        Ok(WebhookOutcome {
            processed: true,
            reason: decision.reason,
            issue_key: task.issue_key,
            queue: Some(receipt.queue),
            changes,
        })
    }
    .instrument(span)
    .await
}
