//! Transport seams between the connection manager and the broker client.

use async_trait::async_trait;
use dispatch_core::{Disposition, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::topology::Topology;

/// Handles one decoded delivery and says how to settle it.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Disposition;
}

/// Settles deliveries on the channel they arrived on.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> Result<()>;
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()>;
}

/// A raw delivery pulled off the queue.
pub struct InboundMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub delivery_tag: u64,
    pub acker: Arc<dyn Acknowledger>,
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessage")
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("delivery_tag", &self.delivery_tag)
            .finish()
    }
}

/// Applies a handler's disposition to a delivery.
pub async fn settle(acker: &dyn Acknowledger, delivery_tag: u64, disposition: Disposition) -> Result<()> {
    match disposition {
        Disposition::Ack => acker.ack(delivery_tag).await,
        Disposition::NackRequeue => acker.nack(delivery_tag, true).await,
        Disposition::NackDrop => acker.nack(delivery_tag, false).await,
    }
}

/// A live connection plus channel.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Declares the queue and bindings, applies prefetch and starts a consumer.
    ///
    /// The receiver closes when the session is lost; that is the only
    /// closure signal the manager relies on.
    async fn consume(&self, topology: &Topology) -> Result<mpsc::Receiver<InboundMessage>>;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

/// Opens sessions; called once at startup and on every reconnect attempt.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connects, opens a channel and declares the exchange.
    async fn connect(&self, topology: &Topology) -> Result<Arc<dyn BrokerSession>>;
}
