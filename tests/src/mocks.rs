//! Mock implementations for testing.
//!
//! Each mock implements the same trait the production component does, so
//! the router and the connection manager run their real code paths.

use async_trait::async_trait;
use audit_store::AuditSink;
use broker::{Acknowledger, BrokerConnector, BrokerSession, InboundMessage, Topology};
use dispatch_core::{Disposition, Error, NotificationAttempt, Result};
use gateway::{DeliveryError, DeliveryReceipt, DeliveryRequest, EscalationDirectory, MessageDelivery};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Delivery gateway that records requests and replays scripted failures.
#[derive(Default)]
pub struct RecordingGateway {
    requests: Mutex<Vec<DeliveryRequest>>,
    failures: Mutex<VecDeque<DeliveryError>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// All requests handed to the gateway, failed ones included.
    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Fail the next delivery with `error`.
    pub fn fail_next(&self, error: DeliveryError) {
        self.failures.lock().push_back(error);
    }
}

#[async_trait]
impl MessageDelivery for RecordingGateway {
    async fn deliver(
        &self,
        request: &DeliveryRequest,
    ) -> std::result::Result<DeliveryReceipt, DeliveryError> {
        let n = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };

        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        Ok(DeliveryReceipt {
            message_id: Some(format!("msg-{}", n)),
            attempts: 1,
        })
    }
}

/// Audit sink that keeps attempts in memory.
#[derive(Default)]
pub struct InMemoryAuditSink {
    attempts: Mutex<Vec<NotificationAttempt>>,
    should_fail: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<NotificationAttempt> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Simulate the audit store being down.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, attempt: &NotificationAttempt) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::storage("mock audit store failure"));
        }
        self.attempts.lock().push(attempt.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Escalation directory backed by a fixed map.
#[derive(Default)]
pub struct StaticDirectory {
    recipients: HashMap<String, String>,
    lookups: Mutex<Vec<Option<String>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tenant_id: &str, recipient: &str) -> Self {
        self.recipients
            .insert(tenant_id.to_string(), recipient.to_string());
        self
    }

    /// Tenant ids the router asked about, in order.
    pub fn lookups(&self) -> Vec<Option<String>> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl EscalationDirectory for StaticDirectory {
    async fn resolve_escalation_recipient(&self, tenant_id: Option<&str>) -> Option<String> {
        self.lookups.lock().push(tenant_id.map(String::from));
        tenant_id.and_then(|t| self.recipients.get(t).cloned())
    }
}

/// Records how each delivery was settled.
#[derive(Default)]
pub struct RecordingAcker {
    settled: Mutex<Vec<(u64, Disposition)>>,
}

impl RecordingAcker {
    pub fn settled(&self) -> Vec<(u64, Disposition)> {
        self.settled.lock().clone()
    }

    pub fn settled_count(&self) -> usize {
        self.settled.lock().len()
    }
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.settled.lock().push((delivery_tag, Disposition::Ack));
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        let disposition = if requeue {
            Disposition::NackRequeue
        } else {
            Disposition::NackDrop
        };
        self.settled.lock().push((delivery_tag, disposition));
        Ok(())
    }
}

/// Builds a delivery as the transport would hand it over.
pub fn inbound(
    acker: &Arc<RecordingAcker>,
    routing_key: &str,
    body: Vec<u8>,
    delivery_tag: u64,
) -> InboundMessage {
    InboundMessage {
        routing_key: routing_key.to_string(),
        body,
        delivery_tag,
        acker: acker.clone(),
    }
}

struct InMemorySession {
    feed: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    open: AtomicBool,
}

#[async_trait]
impl BrokerSession for InMemorySession {
    async fn consume(&self, _topology: &Topology) -> Result<mpsc::Receiver<InboundMessage>> {
        self.feed
            .lock()
            .take()
            .ok_or_else(|| Error::connectivity("session already consuming"))
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Broker stand-in. Every successful connect opens a new feed the test
/// can publish into; dropping a feed ends that session's stream.
#[derive(Default)]
pub struct InMemoryConnector {
    refuse: AtomicU32,
    connects: AtomicU32,
    feeds: Mutex<Vec<mpsc::Sender<InboundMessage>>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: u32) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn open_feeds(&self) -> usize {
        self.feeds.lock().len()
    }

    /// Feed of the most recent session.
    pub fn latest_feed(&self) -> Option<mpsc::Sender<InboundMessage>> {
        self.feeds.lock().last().cloned()
    }

    /// Ends every open session's stream, as a dropped connection would.
    pub fn drop_sessions(&self) {
        self.feeds.lock().clear();
    }
}

#[async_trait]
impl BrokerConnector for InMemoryConnector {
    async fn connect(&self, _topology: &Topology) -> Result<Arc<dyn BrokerSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::connectivity("connection refused"));
        }

        let (tx, rx) = mpsc::channel(1);
        self.feeds.lock().push(tx);
        Ok(Arc::new(InMemorySession {
            feed: Mutex::new(Some(rx)),
            open: AtomicBool::new(true),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_gateway_replays_failures_in_order() {
        let gateway = RecordingGateway::new();
        gateway.fail_next(DeliveryError::Timeout);

        let request = DeliveryRequest::new("628", "hi", "status_updated");
        assert_eq!(gateway.deliver(&request).await, Err(DeliveryError::Timeout));

        let receipt = gateway.deliver(&request).await.unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("msg-2"));
        assert_eq!(gateway.request_count(), 2);
    }

    #[tokio::test]
    async fn test_connector_refuses_then_opens_feed() {
        let connector = InMemoryConnector::new();
        connector.refuse_next(1);
        let topology = Topology::from_config(&broker::BrokerConfig::default());

        assert!(connector.connect(&topology).await.is_err());
        let session = connector.connect(&topology).await.unwrap();

        assert!(session.is_connected());
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.open_feeds(), 1);
    }
}
