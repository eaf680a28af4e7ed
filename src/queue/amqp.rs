//! RabbitMQ implementation of [`BrokerChannel`] over `lapin`.

use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    BoxFuture, BrokerChannel, BrokerConnector, Delivery, DeliveryStream, ExchangeKind,
    MessageProperties, QueueOptions,
};
use crate::{AppError, Result};

const REPLY_SUCCESS: u16 = 200;
const DELIVERY_MODE_PERSISTENT: u8 = 2;
const DELIVERY_MODE_TRANSIENT: u8 = 1;

/// Connects to RabbitMQ and opens a publisher-confirm channel.
pub struct AmqpConnector {
    url: String,
}

impl AmqpConnector {
    /// Connector for an `amqp://` URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl BrokerConnector for AmqpConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Arc<dyn BrokerChannel>>> {
        Box::pin(async move {
            if self.url.trim().is_empty() {
                return Err(AppError::Config(
                    "missing broker configuration: RABBITMQ_URL is required".into(),
                ));
            }

            info!("establishing rabbitmq connection");
            let connection = Connection::connect(&self.url, ConnectionProperties::default())
                .await
                .map_err(|err| AppError::Connection(format!("failed to connect: {err}")))?;

            let channel = connection.create_channel().await?;
            // Confirms let publish report whether the broker took the message.
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await?;
            info!(channel_id = channel.id(), "rabbitmq channel created");

            Ok(Arc::new(AmqpChannel {
                connection,
                channel,
            }) as Arc<dyn BrokerChannel>)
        })
    }
}

/// One connection with a single channel on it.
pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

fn queue_arguments(options: &QueueOptions) -> FieldTable {
    let mut args = FieldTable::default();
    if let Some(exchange) = options.dead_letter_exchange.as_deref() {
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(LongString::from(exchange)),
        );
    }
    if let Some(routing_key) = options.dead_letter_routing_key.as_deref() {
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(LongString::from(routing_key)),
        );
    }
    args
}

fn basic_properties(properties: &MessageProperties) -> BasicProperties {
    let delivery_mode = if properties.persistent {
        DELIVERY_MODE_PERSISTENT
    } else {
        DELIVERY_MODE_TRANSIENT
    };
    BasicProperties::default()
        .with_delivery_mode(delivery_mode)
        .with_content_type(properties.content_type.as_str().into())
}

/// A nack means the broker could not take the message into its buffers.
fn accepted(confirmation: &Confirmation) -> bool {
    !confirmation.is_nack()
}

impl BrokerChannel for AmqpChannel {
    fn declare_exchange<'a>(
        &'a self,
        name: &'a str,
        kind: ExchangeKind,
        durable: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let kind = match kind {
                ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            };
            let options = ExchangeDeclareOptions {
                durable,
                ..ExchangeDeclareOptions::default()
            };
            self.channel
                .exchange_declare(name, kind, options, FieldTable::default())
                .await?;
            Ok(())
        })
    }

    fn declare_queue<'a>(
        &'a self,
        name: &'a str,
        options: &'a QueueOptions,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let declare = QueueDeclareOptions {
                durable: options.durable,
                ..QueueDeclareOptions::default()
            };
            self.channel
                .queue_declare(name, declare, queue_arguments(options))
                .await?;
            Ok(())
        })
    }

    fn bind_queue<'a>(
        &'a self,
        queue: &'a str,
        exchange: &'a str,
        routing_key: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.channel
                .queue_bind(
                    queue,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            Ok(())
        })
    }

    fn publish<'a>(
        &'a self,
        queue: &'a str,
        body: &'a [u8],
        properties: &'a MessageProperties,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let confirm = self
                .channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions::default(),
                    body,
                    basic_properties(properties),
                )
                .await?;
            let confirmation = confirm.await?;
            Ok(accepted(&confirmation))
        })
    }

    fn set_prefetch(&self, count: u16) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.channel
                .basic_qos(count, BasicQosOptions::default())
                .await?;
            Ok(())
        })
    }

    fn consume<'a>(
        &'a self,
        queue: &'a str,
        consumer_tag: &'a str,
    ) -> BoxFuture<'a, Result<DeliveryStream>> {
        Box::pin(async move {
            let mut consumer = self
                .channel
                .basic_consume(
                    queue,
                    consumer_tag,
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await?;

            let (tx, rx) = mpsc::channel(1);
            let tag = consumer_tag.to_owned();
            tokio::spawn(async move {
                while let Some(item) = consumer.next().await {
                    match item {
                        Ok(delivery) => {
                            let forwarded = Delivery {
                                delivery_tag: delivery.delivery_tag,
                                body: delivery.data,
                                redelivered: delivery.redelivered,
                            };
                            if tx.send(forwarded).await.is_err() {
                                debug!(consumer_tag = %tag, "delivery receiver dropped");
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(consumer_tag = %tag, %err, "consumer stream failed");
                            break;
                        }
                    }
                }
                debug!(consumer_tag = %tag, "consumer stream ended");
            });

            Ok(rx)
        })
    }

    fn ack(&self, delivery_tag: u64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.channel
                .basic_ack(delivery_tag, BasicAckOptions::default())
                .await?;
            Ok(())
        })
    }

    fn reject(&self, delivery_tag: u64, requeue: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.channel
                .basic_reject(delivery_tag, BasicRejectOptions { requeue })
                .await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.channel.status().connected() {
                if let Err(err) = self.channel.close(REPLY_SUCCESS, "Bye").await {
                    warn!(%err, "failed to close rabbitmq channel");
                }
            }
            if self.connection.status().connected() {
                self.connection
                    .close(REPLY_SUCCESS, "Bye")
                    .await
                    .map_err(|err| AppError::Connection(format!("failed to close: {err}")))?;
            }
            info!("rabbitmq connection closed");
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}
