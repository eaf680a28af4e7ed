//! In-process broker with RabbitMQ-compatible queue semantics.
//!
//! Models what the pipeline depends on: durable queues with declaration
//! equivalence checks, direct exchanges and bindings, dead-lettering on
//! reject without requeue, per-consumer prefetch with round-robin dispatch
//! across competing consumers, and requeue of unacknowledged deliveries
//! when a channel closes. A refused declaration or binding closes the
//! channel, as RabbitMQ does.
//!
//! [`InMemoryBroker`] is itself a [`BrokerConnector`]; each `connect`
//! opens an independent channel, standing in for a separate process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::{
    BoxFuture, BrokerChannel, BrokerConnector, Delivery, DeliveryStream, ExchangeKind,
    MessageProperties, QueueOptions,
};
use crate::{AppError, Result};

/// Capacity of each subscription's delivery buffer.
const STREAM_CAPACITY: usize = 64;

/// A message stored in a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Payload bytes.
    pub body: Vec<u8>,
    /// Properties it was published with.
    pub properties: MessageProperties,
    /// Set once the message has been delivered and returned.
    pub redelivered: bool,
}

#[derive(Debug)]
struct QueueState {
    options: QueueOptions,
    ready: VecDeque<StoredMessage>,
}

#[derive(Debug)]
struct ExchangeState {
    kind: ExchangeKind,
    durable: bool,
    /// `(routing_key, queue)` pairs.
    bindings: Vec<(String, String)>,
}

#[derive(Debug)]
struct ConsumerState {
    channel_id: u64,
    tag: String,
    queue: String,
    sender: mpsc::Sender<Delivery>,
}

#[derive(Debug)]
struct Unacked {
    channel_id: u64,
    consumer_tag: String,
    queue: String,
    message: StoredMessage,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    exchanges: HashMap<String, ExchangeState>,
    consumers: Vec<ConsumerState>,
    unacked: HashMap<u64, Unacked>,
    /// Prefetch per channel id; 0 means unlimited.
    prefetch: HashMap<u64, u16>,
    next_delivery_tag: u64,
}

impl BrokerState {
    fn in_flight(&self, channel_id: u64, consumer_tag: &str) -> usize {
        self.unacked
            .values()
            .filter(|u| u.channel_id == channel_id && u.consumer_tag == consumer_tag)
            .count()
    }

    fn has_capacity(&self, consumer: &ConsumerState) -> bool {
        let limit = self.prefetch.get(&consumer.channel_id).copied().unwrap_or(0);
        limit == 0 || self.in_flight(consumer.channel_id, &consumer.tag) < usize::from(limit)
    }

    /// Route a dead-lettered message through the queue's dead-letter exchange.
    fn dead_letter(&mut self, queue: &str, mut message: StoredMessage) {
        let Some(options) = self.queues.get(queue).map(|q| q.options.clone()) else {
            return;
        };
        let Some(exchange_name) = options.dead_letter_exchange else {
            debug!(queue, "rejected message dropped; queue has no dead-letter exchange");
            return;
        };
        let routing_key = options
            .dead_letter_routing_key
            .unwrap_or_else(|| queue.to_owned());
        let targets: Vec<String> = self
            .exchanges
            .get(&exchange_name)
            .map(|exchange| {
                exchange
                    .bindings
                    .iter()
                    .filter(|(key, _)| *key == routing_key)
                    .map(|(_, target)| target.clone())
                    .collect()
            })
            .unwrap_or_default();

        message.redelivered = false;
        for target in targets {
            if let Some(target_queue) = self.queues.get_mut(&target) {
                target_queue.ready.push_back(message.clone());
            }
        }
    }

    /// Hand ready messages to consumers with spare prefetch, round-robin.
    fn dispatch(&mut self) {
        let mut progressed = true;
        while progressed {
            progressed = false;
            let mut index = 0;
            while index < self.consumers.len() {
                let eligible = {
                    let consumer = &self.consumers[index];
                    self.has_capacity(consumer)
                        && self
                            .queues
                            .get(&consumer.queue)
                            .is_some_and(|q| !q.ready.is_empty())
                };
                if !eligible {
                    index += 1;
                    continue;
                }

                let queue_name = self.consumers[index].queue.clone();
                let Some(message) = self
                    .queues
                    .get_mut(&queue_name)
                    .and_then(|q| q.ready.pop_front())
                else {
                    index += 1;
                    continue;
                };

                self.next_delivery_tag += 1;
                let delivery_tag = self.next_delivery_tag;
                let delivery = Delivery {
                    delivery_tag,
                    body: message.body.clone(),
                    redelivered: message.redelivered,
                };

                if self.consumers[index].sender.try_send(delivery).is_ok() {
                    let consumer = &self.consumers[index];
                    self.unacked.insert(
                        delivery_tag,
                        Unacked {
                            channel_id: consumer.channel_id,
                            consumer_tag: consumer.tag.clone(),
                            queue: queue_name,
                            message,
                        },
                    );
                    // Move the served consumer to the back for fairness.
                    let served = self.consumers.remove(index);
                    self.consumers.push(served);
                    progressed = true;
                } else {
                    // Receiver gone or full: put the message back and drop
                    // closed subscriptions.
                    if let Some(queue) = self.queues.get_mut(&queue_name) {
                        queue.ready.push_front(message);
                    }
                    if self.consumers[index].sender.is_closed() {
                        self.consumers.remove(index);
                    } else {
                        index += 1;
                    }
                }
            }
        }
    }

    fn close_channel(&mut self, channel_id: u64) {
        self.consumers.retain(|c| c.channel_id != channel_id);
        self.prefetch.remove(&channel_id);

        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| u.channel_id == channel_id)
            .map(|(tag, _)| *tag)
            .collect();
        // Requeue in original order at the head of each queue.
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in tags {
            if let Some(unacked) = self.unacked.remove(&tag) {
                if let Some(queue) = self.queues.get_mut(&unacked.queue) {
                    let mut message = unacked.message;
                    message.redelivered = true;
                    queue.ready.push_front(message);
                }
            }
        }
        self.dispatch();
    }
}

/// Shared broker state plus knobs for exercising failure paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    channels: Arc<Mutex<Vec<Arc<InMemoryChannel>>>>,
    refuse_publishes: Arc<AtomicBool>,
    next_channel_id: Arc<AtomicU64>,
    connects: Arc<AtomicUsize>,
}

impl InMemoryBroker {
    /// Empty broker with no queues or exchanges.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new channel (a separate connection, in effect).
    #[must_use]
    pub fn open_channel(&self) -> Arc<InMemoryChannel> {
        let id = self.next_channel_id.fetch_add(1, Ordering::SeqCst) + 1;
        let channel = Arc::new(InMemoryChannel {
            id,
            broker: self.clone(),
            open: AtomicBool::new(true),
        });
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&channel));
        channel
    }

    /// Make subsequent publishes report that the message was not accepted.
    pub fn refuse_publishes(&self, refuse: bool) {
        self.refuse_publishes.store(refuse, Ordering::SeqCst);
    }

    /// Close every open channel, as a dropped broker connection would.
    pub fn drop_connections(&self) {
        let channels: Vec<_> = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for channel in channels {
            channel.shut();
        }
    }

    /// Number of successful `connect` calls.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Ready (undelivered) message count, or `None` if the queue is unknown.
    #[must_use]
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.lock().queues.get(queue).map(|q| q.ready.len())
    }

    /// Snapshot of the ready messages in `queue`, head first.
    #[must_use]
    pub fn messages(&self, queue: &str) -> Vec<StoredMessage> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Delivered but not yet settled messages across all channels.
    #[must_use]
    pub fn unacked_count(&self) -> usize {
        self.lock().unacked.len()
    }

    /// Declared options of `queue`.
    #[must_use]
    pub fn queue_options(&self, queue: &str) -> Option<QueueOptions> {
        self.lock().queues.get(queue).map(|q| q.options.clone())
    }

    /// Number of declared queues.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.lock().queues.len()
    }

    /// Whether `exchange` exists with the given kind and durability.
    #[must_use]
    pub fn has_exchange(&self, exchange: &str, kind: ExchangeKind, durable: bool) -> bool {
        self.lock()
            .exchanges
            .get(exchange)
            .is_some_and(|e| e.kind == kind && e.durable == durable)
    }

    /// `(routing_key, queue)` bindings of `exchange`.
    #[must_use]
    pub fn bindings(&self, exchange: &str) -> Vec<(String, String)> {
        self.lock()
            .exchanges
            .get(exchange)
            .map(|e| e.bindings.clone())
            .unwrap_or_default()
    }
}

impl BrokerConnector for InMemoryBroker {
    fn connect(&self) -> BoxFuture<'_, Result<Arc<dyn BrokerChannel>>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.open_channel() as Arc<dyn BrokerChannel>)
        })
    }
}

/// One channel on an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryChannel {
    id: u64,
    broker: InMemoryBroker,
    open: AtomicBool,
}

impl InMemoryChannel {
    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Connection(format!("channel {} is closed", self.id)))
        }
    }

    /// Close the channel and requeue its unacknowledged deliveries.
    fn shut(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.broker.lock().close_channel(self.id);
        }
    }

    /// Channel-level protocol error: the broker closes the channel.
    fn refuse(&self, reason: String) -> AppError {
        self.shut();
        AppError::Broker(reason)
    }

    fn declare_exchange_now(&self, name: &str, kind: ExchangeKind, durable: bool) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        let equivalent = state
            .exchanges
            .get(name)
            .map(|existing| existing.kind == kind && existing.durable == durable);
        match equivalent {
            Some(true) => Ok(()),
            Some(false) => {
                drop(state);
                Err(self.refuse(format!(
                    "PRECONDITION_FAILED - inequivalent arg for exchange '{name}'"
                )))
            }
            None => {
                state.exchanges.insert(
                    name.to_owned(),
                    ExchangeState {
                        kind,
                        durable,
                        bindings: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    fn declare_queue_now(&self, name: &str, options: &QueueOptions) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        let equivalent = state
            .queues
            .get(name)
            .map(|existing| existing.options == *options);
        match equivalent {
            Some(true) => Ok(()),
            Some(false) => {
                drop(state);
                Err(self.refuse(format!(
                    "PRECONDITION_FAILED - inequivalent arg for queue '{name}'"
                )))
            }
            None => {
                state.queues.insert(
                    name.to_owned(),
                    QueueState {
                        options: options.clone(),
                        ready: VecDeque::new(),
                    },
                );
                Ok(())
            }
        }
    }

    fn bind_queue_now(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        if !state.queues.contains_key(queue) {
            drop(state);
            return Err(self.refuse(format!("NOT_FOUND - no queue '{queue}'")));
        }
        if !state.exchanges.contains_key(exchange) {
            drop(state);
            return Err(self.refuse(format!("NOT_FOUND - no exchange '{exchange}'")));
        }
        let binding = (routing_key.to_owned(), queue.to_owned());
        if let Some(target) = state.exchanges.get_mut(exchange) {
            if !target.bindings.contains(&binding) {
                target.bindings.push(binding);
            }
        }
        Ok(())
    }

    fn publish_now(&self, queue: &str, body: &[u8], properties: &MessageProperties) -> Result<bool> {
        self.ensure_open()?;
        if self.broker.refuse_publishes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut state = self.broker.lock();
        match state.queues.get_mut(queue) {
            Some(target) => target.ready.push_back(StoredMessage {
                body: body.to_vec(),
                properties: properties.clone(),
                redelivered: false,
            }),
            None => debug!(queue, "unroutable message dropped"),
        }
        state.dispatch();
        Ok(true)
    }

    fn consume_now(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        if !state.queues.contains_key(queue) {
            drop(state);
            return Err(self.refuse(format!("NOT_FOUND - no queue '{queue}'")));
        }
        let (sender, receiver) = mpsc::channel(STREAM_CAPACITY);
        state.consumers.push(ConsumerState {
            channel_id: self.id,
            tag: consumer_tag.to_owned(),
            queue: queue.to_owned(),
            sender,
        });
        state.dispatch();
        Ok(receiver)
    }

    fn settle(&self, delivery_tag: u64, requeue: Option<bool>) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        let owned = state
            .unacked
            .get(&delivery_tag)
            .is_some_and(|u| u.channel_id == self.id);
        if !owned {
            drop(state);
            return Err(self.refuse(format!(
                "PRECONDITION_FAILED - unknown delivery tag {delivery_tag}"
            )));
        }
        let Some(unacked) = state.unacked.remove(&delivery_tag) else {
            return Ok(());
        };
        match requeue {
            None => {}
            Some(true) => {
                let mut message = unacked.message;
                message.redelivered = true;
                if let Some(queue) = state.queues.get_mut(&unacked.queue) {
                    queue.ready.push_front(message);
                }
            }
            Some(false) => state.dead_letter(&unacked.queue, unacked.message),
        }
        state.dispatch();
        Ok(())
    }
}

impl BrokerChannel for InMemoryChannel {
    fn declare_exchange<'a>(
        &'a self,
        name: &'a str,
        kind: ExchangeKind,
        durable: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.declare_exchange_now(name, kind, durable) })
    }

    fn declare_queue<'a>(
        &'a self,
        name: &'a str,
        options: &'a QueueOptions,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.declare_queue_now(name, options) })
    }

    fn bind_queue<'a>(
        &'a self,
        queue: &'a str,
        exchange: &'a str,
        routing_key: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.bind_queue_now(queue, exchange, routing_key) })
    }

    fn publish<'a>(
        &'a self,
        queue: &'a str,
        body: &'a [u8],
        properties: &'a MessageProperties,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { self.publish_now(queue, body, properties) })
    }

    fn set_prefetch(&self, count: u16) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.ensure_open()?;
            let mut state = self.broker.lock();
            state.prefetch.insert(self.id, count);
            state.dispatch();
            Ok(())
        })
    }

    fn consume<'a>(
        &'a self,
        queue: &'a str,
        consumer_tag: &'a str,
    ) -> BoxFuture<'a, Result<DeliveryStream>> {
        Box::pin(async move { self.consume_now(queue, consumer_tag) })
    }

    fn ack(&self, delivery_tag: u64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.settle(delivery_tag, None) })
    }

    fn reject(&self, delivery_tag: u64, requeue: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.settle(delivery_tag, Some(requeue)) })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.shut();
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
