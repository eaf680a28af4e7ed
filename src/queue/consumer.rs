//! Single-slot task consumer with dead-letter on failure.
//!
//! Each consumer holds at most one unacknowledged delivery (prefetch 1).
//! A delivery is acknowledged only after the handler succeeds; a body that
//! does not decode, a handler error, and a handler panic are all rejected
//! without requeue, which routes the message to the dead-letter queue.
//! There is no retry: one failure is terminal for that delivery.
//!
//! The handler runs without a timeout. A handler that never completes
//! occupies this consumer's only slot until the process is stopped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{BoxFuture, BrokerChannel, ChannelManager, Delivery, DeliveryStream, QueueTopology};
use crate::models::task::Task;
use crate::txn::resolve_txn_id;
use crate::{AppError, Result};

/// Unacknowledged deliveries allowed per consumer.
pub const PREFETCH: u16 = 1;

/// Processes one decoded task.
pub trait TaskHandler: Send + Sync {
    /// Handle `task`. Any error dead-letters the delivery.
    ///
    /// # Errors
    ///
    /// Implementations return `AppError::Handler` (or any other variant) to
    /// reject the task.
    fn handle<'a>(&'a self, task: Task, txn_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handler succeeded; message removed from the work queue.
    Acknowledged {
        /// Issue the task was for.
        issue_key: String,
        /// Correlation id from the message.
        txn_id: String,
    },
    /// Message rejected without requeue.
    DeadLettered {
        /// Why it was rejected.
        reason: String,
    },
}

/// Competing consumer on the work queue.
pub struct TaskConsumer {
    channels: Arc<ChannelManager>,
    topology: QueueTopology,
    consumer_tag: String,
}

impl TaskConsumer {
    /// Consumer with a fresh per-process consumer tag.
    #[must_use]
    pub fn new(channels: Arc<ChannelManager>, topology: QueueTopology) -> Self {
        Self {
            channels,
            topology,
            consumer_tag: format!("jira-automation-{}", Uuid::new_v4()),
        }
    }

    /// Tag this consumer registers with the broker.
    #[must_use]
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Consume tasks until `cancel` fires.
    ///
    /// Declares topology, sets prefetch to [`PREFETCH`], subscribes, and
    /// processes deliveries strictly one at a time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` when the delivery stream ends because
    /// the channel closed (the cached channel is invalidated first), or any
    /// error from setting up the subscription or acknowledging a delivery.
    pub async fn run(
        &self,
        handler: &Arc<dyn TaskHandler>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(consumer_tag = %self.consumer_tag, "starting task consumer");

        let channel = self.channels.acquire_channel().await?;
        let mut deliveries = match self.subscribe(&channel).await {
            Ok(stream) => stream,
            Err(err) => {
                self.channels.observe(&channel).await;
                return Err(err);
            }
        };

        info!(
            consumer_tag = %self.consumer_tag,
            queue = %self.topology.work_queue(),
            "consumer started"
        );

        loop {
            let delivery = tokio::select! {
                () = cancel.cancelled() => {
                    info!(consumer_tag = %self.consumer_tag, "task consumer shutting down");
                    return Ok(());
                }
                next = deliveries.recv() => next,
            };

            let Some(delivery) = delivery else {
                self.channels.report_fault("delivery stream closed").await;
                return Err(AppError::Connection(format!(
                    "delivery stream for {} closed",
                    self.topology.work_queue()
                )));
            };

            if let Err(err) = process_delivery(channel.as_ref(), handler.as_ref(), delivery).await {
                error!(%err, "failed to settle delivery");
                self.channels.observe(&channel).await;
                return Err(err);
            }
        }
    }

    async fn subscribe(&self, channel: &Arc<dyn BrokerChannel>) -> Result<DeliveryStream> {
        let queues = self.topology.ensure(channel).await?;
        channel.set_prefetch(PREFETCH).await?;
        channel.consume(&queues.work_queue, &self.consumer_tag).await
    }
}

/// Decode, handle, and settle a single delivery.
///
/// # Errors
///
/// Returns an error only when the ack or reject itself fails; handler and
/// decode failures are reported through [`DeliveryOutcome::DeadLettered`].
pub async fn process_delivery(
    channel: &dyn BrokerChannel,
    handler: &dyn TaskHandler,
    delivery: Delivery,
) -> Result<DeliveryOutcome> {
    let task = match Task::from_bytes(&delivery.body) {
        Ok(task) => task,
        Err(err) => {
            error!(
                delivery_tag = delivery.delivery_tag,
                %err,
                "failed to parse task; dead-lettering"
            );
            channel.reject(delivery.delivery_tag, false).await?;
            return Ok(DeliveryOutcome::DeadLettered {
                reason: err.to_string(),
            });
        }
    };

    let txn_id = resolve_txn_id(task.txn_id.as_deref());
    let issue_key = task.issue_key.clone();
    let span = info_span!("process_task", txn_id = %txn_id, issue_key = %issue_key);

    async {
        if delivery.redelivered {
            warn!("task was delivered before; processing again");
        }
        info!("processing task");

        let result = AssertUnwindSafe(handler.handle(task, &txn_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AppError::Handler("handler panicked".into())));

        match result {
            Ok(()) => {
                channel.ack(delivery.delivery_tag).await?;
                info!("task completed");
                Ok(DeliveryOutcome::Acknowledged {
                    issue_key: issue_key.clone(),
                    txn_id: txn_id.clone(),
                })
            }
            Err(err) => {
                error!(%err, "task failed; dead-lettering");
                channel.reject(delivery.delivery_tag, false).await?;
                Ok(DeliveryOutcome::DeadLettered {
                    reason: err.to_string(),
                })
            }
        }
    }
    .instrument(span)
    .await
}
