//! Broker connection manager.
//!
//! Owns the current session, the registered handler and the single
//! processing task. Lifecycle:
//!
//! ```text
//! Disconnected ──start_consuming──> Running ──stream closed──> Reconnecting
//!                                      ^                           │
//!                                      └────── reconnected ────────┘
//! any state ──shutdown──> ShuttingDown
//! ```

use dispatch_core::{Disposition, Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use telemetry::{health, metrics};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::amqp::AmqpConnector;
use crate::config::{BrokerConfig, ReconnectPolicy};
use crate::session::{settle, BrokerConnector, BrokerSession, InboundMessage, MessageHandler};
use crate::topology::Topology;

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Disconnected,
    Running,
    Reconnecting,
    ShuttingDown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Running => "running",
            Self::Reconnecting => "reconnecting",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

struct Inner {
    connector: Arc<dyn BrokerConnector>,
    topology: Topology,
    policy: ReconnectPolicy,
    state: Mutex<LifecycleState>,
    session: Mutex<Option<Arc<dyn BrokerSession>>>,
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Keeps events flowing to the handler across broker outages.
#[derive(Clone)]
pub struct BrokerConnectionManager {
    inner: Arc<Inner>,
}

impl BrokerConnectionManager {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        topology: Topology,
        policy: ReconnectPolicy,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                connector,
                topology,
                policy,
                state: Mutex::new(LifecycleState::Disconnected),
                session: Mutex::new(None),
                handler: Mutex::new(None),
                consumer: Mutex::new(None),
                shutdown_tx,
            }),
        }
    }

    /// Manager over the AMQP transport.
    pub fn from_config(config: &BrokerConfig, policy: ReconnectPolicy) -> Self {
        Self::new(
            Arc::new(AmqpConnector::new(config.amqp_url.clone())),
            Topology::from_config(config),
            policy,
        )
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock()
    }

    pub fn topology(&self) -> &Topology {
        &self.inner.topology
    }

    /// Whether a live session exists.
    pub fn is_connected(&self) -> bool {
        self.current_session().is_some_and(|s| s.is_connected())
    }

    /// Opens a session and declares the exchange.
    pub async fn connect(&self) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::connectivity("broker manager is shutting down"));
        }

        let session = match self.inner.connector.connect(&self.inner.topology).await {
            Ok(session) => session,
            Err(e) => {
                health().broker.set_unhealthy(e.to_string());
                return Err(e);
            }
        };

        self.replace_session(Some(session));
        health().broker.set_healthy();
        metrics().broker_connected.set(1);
        Ok(())
    }

    /// Registers `handler` and starts consuming on the current session.
    ///
    /// The handler is kept even when this fails, so a later reconnect
    /// resumes consumption without the caller registering it again.
    pub async fn start_consuming(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        *self.inner.handler.lock() = Some(handler.clone());

        let session = self
            .current_session()
            .ok_or_else(|| Error::connectivity("not connected to broker"))?;
        let rx = session.consume(&self.inner.topology).await?;

        {
            let mut state = self.inner.state.lock();
            match *state {
                LifecycleState::Disconnected | LifecycleState::Running => {
                    *state = LifecycleState::Running
                }
                other => {
                    // The reconnect loop resumes consumption with the stored handler.
                    return Err(Error::connectivity(format!(
                        "cannot start consuming while {}",
                        other.as_str()
                    )));
                }
            }
        }

        self.spawn_processing(rx, handler);
        info!(queue = %self.inner.topology.queue, "Broker consumption started");
        Ok(())
    }

    /// Starts the reconnect loop unless one is running or shutdown began.
    pub fn trigger_reconnect(&self) {
        {
            let mut state = self.inner.state.lock();
            match *state {
                LifecycleState::ShuttingDown | LifecycleState::Reconnecting => {
                    debug!(state = state.as_str(), "Reconnect already in progress or suppressed");
                    return;
                }
                _ => *state = LifecycleState::Reconnecting,
            }
        }

        health().broker.set_unhealthy("reconnecting");
        metrics().broker_connected.set(0);
        self.replace_session(None);

        let this = self.clone();
        tokio::spawn(async move { this.reconnect_loop().await });
    }

    /// Stops consumption, lets the in-flight message finish, then closes the session.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == LifecycleState::ShuttingDown {
                return;
            }
            *state = LifecycleState::ShuttingDown;
        }

        info!("Shutting down broker connection");
        self.inner.shutdown_tx.send_replace(true);

        let consumer = self.inner.consumer.lock().take();
        if let Some(task) = consumer {
            if let Err(e) = task.await {
                warn!(error = %e, "Processing task ended abnormally");
            }
        }

        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Failed to close broker session cleanly");
            }
        }

        health().broker.set_unhealthy("shut down");
        metrics().broker_connected.set(0);
        info!("Broker connection closed");
    }

    fn is_shutting_down(&self) -> bool {
        self.state() == LifecycleState::ShuttingDown
    }

    /// Moves to `to` unless shutdown has begun.
    fn transition(&self, to: LifecycleState) {
        let mut state = self.inner.state.lock();
        if *state != LifecycleState::ShuttingDown {
            *state = to;
        }
    }

    fn current_session(&self) -> Option<Arc<dyn BrokerSession>> {
        self.inner.session.lock().clone()
    }

    fn replace_session(&self, session: Option<Arc<dyn BrokerSession>>) {
        let previous = std::mem::replace(&mut *self.inner.session.lock(), session);
        if let Some(previous) = previous {
            tokio::spawn(async move {
                if let Err(e) = previous.close().await {
                    debug!(error = %e, "Stale broker session did not close cleanly");
                }
            });
        }
    }

    /// Must run after the state is `Running`, so a stream that is already
    /// closed still triggers a reconnect.
    fn spawn_processing(&self, rx: mpsc::Receiver<InboundMessage>, handler: Arc<dyn MessageHandler>) {
        let this = self.clone();
        let task = tokio::spawn(async move { this.process(rx, handler).await });
        *self.inner.consumer.lock() = Some(task);
    }

    /// The single processing task: one message at a time, settled before the next.
    async fn process(self, mut rx: mpsc::Receiver<InboundMessage>, handler: Arc<dyn MessageHandler>) {
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let message = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => return,
                message = rx.recv() => message,
            };

            match message {
                Some(message) => self.handle_one(message, &handler).await,
                None => break,
            }
        }

        if self.is_shutting_down() {
            return;
        }

        warn!("Delivery stream closed unexpectedly");
        self.trigger_reconnect();
    }

    async fn handle_one(&self, message: InboundMessage, handler: &Arc<dyn MessageHandler>) {
        let InboundMessage {
            routing_key,
            body,
            delivery_tag,
            acker,
        } = message;

        metrics().messages_received.inc();
        metrics().in_flight.inc();
        let started = Instant::now();

        let disposition = dispatch(handler.clone(), routing_key.clone(), body).await;

        metrics()
            .handle_latency_ms
            .observe(started.elapsed().as_millis() as u64);
        metrics().in_flight.dec();

        match disposition {
            Disposition::Ack => metrics().messages_acked.inc(),
            Disposition::NackRequeue => metrics().messages_requeued.inc(),
            Disposition::NackDrop => metrics().messages_dropped.inc(),
        }

        debug!(
            routing_key = %routing_key,
            delivery_tag = delivery_tag,
            disposition = %disposition,
            "Settling delivery"
        );

        if let Err(e) = settle(acker.as_ref(), delivery_tag, disposition).await {
            warn!(
                routing_key = %routing_key,
                delivery_tag = delivery_tag,
                error = %e,
                "Failed to settle delivery"
            );
        }
    }

    async fn reconnect_loop(self) {
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let mut attempt: u32 = 0;

        loop {
            if self.is_shutting_down() {
                return;
            }

            if !self.inner.policy.should_retry(attempt) {
                error!(attempts = attempt, "Giving up reconnecting to broker");
                self.transition(LifecycleState::Disconnected);
                health()
                    .broker
                    .set_unhealthy("reconnect attempts exhausted");
                return;
            }

            let delay = self.inner.policy.delay_for_attempt(attempt);
            info!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to broker"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => return,
            }

            match self.reestablish().await {
                Ok(()) => {
                    metrics().broker_reconnects.inc();
                    info!(attempt = attempt, "Reconnected to broker");
                    return;
                }
                Err(e) => {
                    metrics().broker_reconnect_failures.inc();
                    warn!(attempt = attempt, error = %e, "Reconnect attempt failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Connects and resumes consumption with the stored handler.
    async fn reestablish(&self) -> Result<()> {
        let session = self.inner.connector.connect(&self.inner.topology).await?;

        let handler = self.inner.handler.lock().clone();
        let consumption = match handler {
            Some(handler) => match session.consume(&self.inner.topology).await {
                Ok(rx) => Some((rx, handler)),
                Err(e) => {
                    discard(session, "consume failed").await;
                    return Err(e);
                }
            },
            None => None,
        };

        let shutting_down = {
            let mut state = self.inner.state.lock();
            let shutting_down = *state == LifecycleState::ShuttingDown;
            if !shutting_down {
                *self.inner.session.lock() = Some(session.clone());
                *state = LifecycleState::Running;
            }
            shutting_down
        };
        if shutting_down {
            discard(session, "shutdown began").await;
            return Err(Error::connectivity("shutdown began during reconnect"));
        }
        health().broker.set_healthy();
        metrics().broker_connected.set(1);

        if let Some((rx, handler)) = consumption {
            self.spawn_processing(rx, handler);
        }
        Ok(())
    }
}

async fn discard(session: Arc<dyn BrokerSession>, reason: &str) {
    if let Err(e) = session.close().await {
        debug!(reason = reason, error = %e, "Discarded broker session did not close cleanly");
    }
}

/// Runs the handler in its own task so a panic costs one message, not the consumer.
async fn dispatch(handler: Arc<dyn MessageHandler>, routing_key: String, body: Vec<u8>) -> Disposition {
    let key = routing_key.clone();
    match tokio::spawn(async move { handler.handle(&key, &body).await }).await {
        Ok(disposition) => disposition,
        Err(e) => {
            error!(routing_key = %routing_key, error = %e, "Message handler panicked");
            Disposition::NackRequeue
        }
    }
}
