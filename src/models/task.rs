//! The unit of queued work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::IssueSnapshot;
use crate::{AppError, Result};

/// Automation task as carried on the work queue.
///
/// Serialized as a camelCase JSON object. `txn_id` is set by the publisher
/// from the originating request; the consumer synthesizes one when a body
/// arrives without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Issue key, e.g. `PROJ-1`.
    pub issue_key: String,
    /// Enriched issue detail.
    pub issue: IssueSnapshot,
    /// Originating webhook time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Correlation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,
    /// Stamped by the publisher immediately before sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build an unpublished task for `issue`.
    #[must_use]
    pub fn new(issue: IssueSnapshot, timestamp: i64, txn_id: impl Into<String>) -> Self {
        Self {
            issue_key: issue.key.clone(),
            issue,
            timestamp,
            txn_id: Some(txn_id.into()),
            published_at: None,
        }
    }

    /// Encode the task as a JSON message body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Publish` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|err| AppError::Publish(format!("failed to serialize task: {err}")))
    }

    /// Decode a message body into a task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedTask` if the body is not a valid task
    /// document or names an empty issue key.
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let task: Self = serde_json::from_slice(body)
            .map_err(|err| AppError::MalformedTask(err.to_string()))?;
        if task.issue_key.trim().is_empty() {
            return Err(AppError::MalformedTask("issueKey must not be empty".into()));
        }
        Ok(task)
    }
}
