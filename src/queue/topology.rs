//! Work queue and dead-letter topology declaration.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use super::{BrokerChannel, ExchangeKind, QueueOptions};
use crate::config::BrokerConfig;
use crate::Result;

/// Names of the queues after a successful declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredQueues {
    /// Queue tasks are published to.
    pub work_queue: String,
    /// Queue rejected tasks are routed to.
    pub dead_letter_queue: String,
}

/// The three durable entities the pipeline relies on.
///
/// - work queue, whose rejected messages are dead-lettered to
///   `dead_letter_exchange` with the work queue's name as routing key;
/// - direct `dead_letter_exchange`;
/// - dead-letter queue bound to the exchange under that same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    work_queue: String,
    dead_letter_queue: String,
    dead_letter_exchange: String,
}

impl QueueTopology {
    /// Topology with the given entity names.
    #[must_use]
    pub fn new(
        work_queue: impl Into<String>,
        dead_letter_queue: impl Into<String>,
        dead_letter_exchange: impl Into<String>,
    ) -> Self {
        Self {
            work_queue: work_queue.into(),
            dead_letter_queue: dead_letter_queue.into(),
            dead_letter_exchange: dead_letter_exchange.into(),
        }
    }

    /// Topology named by the `[broker]` config section.
    #[must_use]
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(
            &config.work_queue,
            &config.dead_letter_queue,
            &config.dead_letter_exchange,
        )
    }

    /// Work queue name.
    #[must_use]
    pub fn work_queue(&self) -> &str {
        &self.work_queue
    }

    /// Dead-letter queue name.
    #[must_use]
    pub fn dead_letter_queue(&self) -> &str {
        &self.dead_letter_queue
    }

    /// Dead-letter exchange name.
    #[must_use]
    pub fn dead_letter_exchange(&self) -> &str {
        &self.dead_letter_exchange
    }

    /// Declaration options for the work queue.
    #[must_use]
    pub fn work_queue_options(&self) -> QueueOptions {
        QueueOptions::durable().with_dead_letter(&self.dead_letter_exchange, &self.work_queue)
    }

    /// Declare the exchange, dead-letter queue, binding, and work queue.
    ///
    /// Every step is an idempotent AMQP declare, so this is safe to run
    /// before each publish and from several processes at once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Broker` when an existing entity was declared with
    /// different parameters, or `AppError::Connection` on a channel fault.
    pub async fn ensure(&self, channel: &Arc<dyn BrokerChannel>) -> Result<DeclaredQueues> {
        async {
            channel
                .declare_exchange(&self.dead_letter_exchange, ExchangeKind::Direct, true)
                .await?;
            channel
                .declare_queue(&self.dead_letter_queue, &QueueOptions::durable())
                .await?;
            channel
                .bind_queue(
                    &self.dead_letter_queue,
                    &self.dead_letter_exchange,
                    &self.work_queue,
                )
                .await?;
            channel
                .declare_queue(&self.work_queue, &self.work_queue_options())
                .await?;

            debug!("queue topology asserted");

            Ok(DeclaredQueues {
                work_queue: self.work_queue.clone(),
                dead_letter_queue: self.dead_letter_queue.clone(),
            })
        }
        .instrument(info_span!(
            "ensure_topology",
            work_queue = %self.work_queue,
            dead_letter_queue = %self.dead_letter_queue,
        ))
        .await
    }
}
