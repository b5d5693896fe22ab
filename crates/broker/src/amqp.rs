//! AMQP 0-9-1 transport built on `lapin`.

use async_trait::async_trait;
use dispatch_core::{Error, Result};
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::session::{Acknowledger, BrokerConnector, BrokerSession, InboundMessage};
use crate::topology::Topology;

const CLOSE_REPLY_SUCCESS: u16 = 200;

fn amqp_error(context: &str, e: lapin::Error) -> Error {
    Error::connectivity(format!("{}: {}", context, e))
}

/// Connects to an AMQP broker by URI.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    url: String,
}

impl AmqpConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self, topology: &Topology) -> Result<Arc<dyn BrokerSession>> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| amqp_error("Failed to connect to broker", e))?;

        // Connection-level errors end the delivery stream, which the
        // manager treats as the session being lost.
        let lost = Arc::new(Notify::new());
        {
            let lost = lost.clone();
            connection.on_error(move |e| {
                warn!(error = %e, "Broker connection error");
                lost.notify_one();
            });
        }

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| amqp_error("Failed to open channel", e))?;

        channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| amqp_error("Failed to declare exchange", e))?;

        info!(exchange = %topology.exchange, "Connected to broker");

        Ok(Arc::new(AmqpSession {
            connection,
            channel,
            lost,
        }))
    }
}

/// One connection with one channel.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    lost: Arc<Notify>,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn consume(&self, topology: &Topology) -> Result<mpsc::Receiver<InboundMessage>> {
        let mut queue_args = FieldTable::default();
        queue_args.insert(
            "x-message-ttl".into(),
            AMQPValue::LongUInt(topology.message_ttl_ms),
        );

        self.channel
            .queue_declare(
                &topology.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                queue_args,
            )
            .await
            .map_err(|e| amqp_error("Failed to declare queue", e))?;

        for key in &topology.routing_keys {
            self.channel
                .queue_bind(
                    &topology.queue,
                    &topology.exchange,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| amqp_error("Failed to bind queue", e))?;
        }

        self.channel
            .basic_qos(topology.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| amqp_error("Failed to set prefetch", e))?;

        let mut consumer = self
            .channel
            .basic_consume(
                &topology.queue,
                &topology.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| amqp_error("Failed to start consumer", e))?;

        info!(
            queue = %topology.queue,
            bindings = ?topology.routing_keys,
            prefetch = topology.prefetch,
            "Consuming"
        );

        let (tx, rx) = mpsc::channel(1);
        let acker: Arc<dyn Acknowledger> = Arc::new(ChannelAcker {
            channel: self.channel.clone(),
        });
        let lost = self.lost.clone();

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = lost.notified() => break,
                    next = consumer.next() => next,
                };

                match next {
                    Some(Ok(delivery)) => {
                        let message = InboundMessage {
                            routing_key: delivery.routing_key.as_str().to_string(),
                            body: delivery.data,
                            delivery_tag: delivery.delivery_tag,
                            acker: acker.clone(),
                        };
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Delivery stream failed");
                        break;
                    }
                    None => break,
                }
            }
            debug!("Delivery stream ended");
        });

        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(&self) -> Result<()> {
        if self.channel.status().connected() {
            self.channel
                .close(CLOSE_REPLY_SUCCESS, "shutdown")
                .await
                .map_err(|e| amqp_error("Failed to close channel", e))?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(CLOSE_REPLY_SUCCESS, "shutdown")
                .await
                .map_err(|e| amqp_error("Failed to close connection", e))?;
        }
        Ok(())
    }
}

struct ChannelAcker {
    channel: Channel,
}

#[async_trait]
impl Acknowledger for ChannelAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| amqp_error("Failed to ack delivery", e))
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                },
            )
            .await
            .map_err(|e| amqp_error("Failed to nack delivery", e))
    }
}
