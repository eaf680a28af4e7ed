//! Durable task queue: broker abstraction, topology, publishing, consuming.
//!
//! [`BrokerChannel`] is the narrow set of AMQP 0-9-1 operations the pipeline
//! needs. [`amqp`] implements it over a real RabbitMQ connection. With the
//! `in-memory-broker` feature, `memory` implements it in-process with the
//! same durable-queue, dead-letter and prefetch semantics.

pub mod amqp;
pub mod connection;
pub mod consumer;
#[cfg(any(test, feature = "in-memory-broker"))]
pub mod memory;
pub mod publisher;
pub mod topology;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::Result;

pub use connection::{ChannelManager, ConnectionState};
pub use consumer::{DeliveryOutcome, TaskConsumer, TaskHandler};
pub use publisher::{PublishReceipt, TaskPublisher};
pub use topology::{DeclaredQueues, QueueTopology};

/// Boxed future returned by broker and handler trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Routing behavior of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Route by exact routing-key match.
    Direct,
}

/// Parameters for a queue declaration.
///
/// Two declarations of the same queue are compatible only when every field
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Survive a broker restart.
    pub durable: bool,
    /// Exchange that receives messages rejected without requeue.
    pub dead_letter_exchange: Option<String>,
    /// Routing key used when dead-lettering.
    pub dead_letter_routing_key: Option<String>,
}

impl QueueOptions {
    /// A durable queue with no dead-letter routing.
    #[must_use]
    pub fn durable() -> Self {
        Self {
            durable: true,
            dead_letter_exchange: None,
            dead_letter_routing_key: None,
        }
    }

    /// Route rejected messages to `exchange` under `routing_key`.
    #[must_use]
    pub fn with_dead_letter(mut self, exchange: &str, routing_key: &str) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self.dead_letter_routing_key = Some(routing_key.to_owned());
        self
    }
}

/// Per-message publish properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageProperties {
    /// Survive a broker restart (delivery mode 2).
    pub persistent: bool,
    /// MIME type of the body.
    pub content_type: String,
}

impl MessageProperties {
    /// Persistent JSON message.
    #[must_use]
    pub fn persistent_json() -> Self {
        Self {
            persistent: true,
            content_type: "application/json".into(),
        }
    }
}

/// A message handed to a consumer, awaiting ack or reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to ack or reject.
    pub delivery_tag: u64,
    /// Payload bytes.
    pub body: Vec<u8>,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
}

/// Stream of deliveries for one subscription. Closes when the channel does.
pub type DeliveryStream = mpsc::Receiver<Delivery>;

/// Broker operations used by topology, publisher, and consumer.
///
/// Implementations must be cheap to share behind an `Arc`; all methods take
/// `&self`.
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange. Redeclaring with the same kind and durability is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Broker` on conflicting parameters.
    fn declare_exchange<'a>(
        &'a self,
        name: &'a str,
        kind: ExchangeKind,
        durable: bool,
    ) -> BoxFuture<'a, Result<()>>;

    /// Declare a queue. Redeclaring with identical options is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Broker` when `options` conflict with an existing
    /// queue of the same name.
    fn declare_queue<'a>(
        &'a self,
        name: &'a str,
        options: &'a QueueOptions,
    ) -> BoxFuture<'a, Result<()>>;

    /// Bind `queue` to `exchange` under `routing_key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Broker` if either side does not exist.
    fn bind_queue<'a>(
        &'a self,
        queue: &'a str,
        exchange: &'a str,
        routing_key: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Publish `body` to `queue` through the default exchange.
    ///
    /// Resolves to `false` when the broker did not accept the message into
    /// its buffers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` if the channel is closed.
    fn publish<'a>(
        &'a self,
        queue: &'a str,
        body: &'a [u8],
        properties: &'a MessageProperties,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Limit unacknowledged deliveries per consumer on this channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` if the channel is closed.
    fn set_prefetch(&self, count: u16) -> BoxFuture<'_, Result<()>>;

    /// Subscribe to `queue` with manual acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Broker` if the queue does not exist.
    fn consume<'a>(
        &'a self,
        queue: &'a str,
        consumer_tag: &'a str,
    ) -> BoxFuture<'a, Result<DeliveryStream>>;

    /// Acknowledge a delivery, removing the message permanently.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Broker` for an unknown delivery tag.
    fn ack(&self, delivery_tag: u64) -> BoxFuture<'_, Result<()>>;

    /// Reject a delivery. Without requeue the message is dead-lettered when
    /// its queue has a dead-letter exchange, otherwise dropped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Broker` for an unknown delivery tag.
    fn reject(&self, delivery_tag: u64, requeue: bool) -> BoxFuture<'_, Result<()>>;

    /// Close the channel and its underlying connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` if closing fails.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// Whether the channel can still carry operations.
    fn is_open(&self) -> bool;
}

/// Opens new broker channels on demand.
pub trait BrokerConnector: Send + Sync {
    /// Establish a connection and open a channel on it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when connection settings are missing, or
    /// `AppError::Connection` when the broker cannot be reached.
    fn connect(&self) -> BoxFuture<'_, Result<Arc<dyn BrokerChannel>>>;
}
