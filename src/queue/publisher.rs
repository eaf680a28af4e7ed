//! Persistent task publishing.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use super::{BrokerChannel, ChannelManager, MessageProperties, QueueTopology};
use crate::models::task::Task;
use crate::{AppError, Result};

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    /// Broker confirmed the message.
    pub published: bool,
    /// Queue it was routed to.
    pub queue: String,
}

/// Publishes tasks to the durable work queue.
pub struct TaskPublisher {
    channels: Arc<ChannelManager>,
    topology: QueueTopology,
}

impl TaskPublisher {
    /// Publisher sharing `channels`.
    #[must_use]
    pub fn new(channels: Arc<ChannelManager>, topology: QueueTopology) -> Self {
        Self { channels, topology }
    }

    /// Queue names this publisher targets.
    #[must_use]
    pub fn topology(&self) -> &QueueTopology {
        &self.topology
    }

    /// Stamp `publishedAt`, serialize, and publish `task` persistently.
    ///
    /// Topology is re-asserted first so a broker restart that wiped it does
    /// not swallow the message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Publish` if the broker did not accept the message,
    /// or the underlying connection/broker error. A channel that closed
    /// during the attempt is invalidated so the next call reconnects.
    pub async fn publish(&self, task: &Task, txn_id: &str) -> Result<PublishReceipt> {
        info!(txn_id, issue_key = %task.issue_key, "publishing task");

        let channel = self.channels.acquire_channel().await?;
        let result = self.publish_on(&channel, task, txn_id).await;
        if result.is_err() {
            self.channels.observe(&channel).await;
        }
        result
    }

    async fn publish_on(
        &self,
        channel: &Arc<dyn BrokerChannel>,
        task: &Task,
        txn_id: &str,
    ) -> Result<PublishReceipt> {
        let queues = self.topology.ensure(channel).await?;

        let mut message = task.clone();
        message.txn_id = Some(txn_id.to_owned());
        message.published_at = Some(Utc::now());
        let body = message.to_bytes()?;

        let accepted = channel
            .publish(&queues.work_queue, &body, &MessageProperties::persistent_json())
            .await?;

        if !accepted {
            error!(txn_id, issue_key = %task.issue_key, "broker did not accept task");
            return Err(AppError::Publish(format!(
                "broker did not accept task {} for queue {}",
                task.issue_key, queues.work_queue
            )));
        }

        info!(
            txn_id,
            issue_key = %task.issue_key,
            queue = %queues.work_queue,
            "task published"
        );

        Ok(PublishReceipt {
            published: true,
            queue: queues.work_queue,
        })
    }
}
