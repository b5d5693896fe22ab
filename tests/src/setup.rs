//! Common test setup functions.

use api::{router, AppState};
use audit_store::AuditLogger;
use axum::Router;
use broker::{BrokerConfig, BrokerConnectionManager, LifecycleState, ReconnectPolicy, Topology};
use dispatch_core::{Disposition, NotificationAttempt};
use dispatcher::{EventRouter, RouterConfig};
use gateway::{BreakerConfig, CircuitBreaker};
use std::sync::Arc;
use std::time::Duration;

use crate::mocks::{InMemoryAuditSink, InMemoryConnector, RecordingGateway, StaticDirectory};

/// Event router wired to in-memory delivery, directory and audit.
pub struct TestContext {
    pub gateway: Arc<RecordingGateway>,
    pub directory: Arc<StaticDirectory>,
    pub audit: Arc<InMemoryAuditSink>,
    pub router: Arc<EventRouter>,
}

impl TestContext {
    pub fn new(config: RouterConfig) -> Self {
        Self::with_directory(config, StaticDirectory::new())
    }

    pub fn with_directory(config: RouterConfig, directory: StaticDirectory) -> Self {
        let gateway = Arc::new(RecordingGateway::new());
        let directory = Arc::new(directory);
        let audit = Arc::new(InMemoryAuditSink::new());

        let router = Arc::new(EventRouter::new(
            config,
            gateway.clone(),
            directory.clone(),
            AuditLogger::new(audit.clone()),
        ));

        Self {
            gateway,
            directory,
            audit,
            router,
        }
    }

    /// Routes one serialized event.
    pub async fn route(&self, routing_key: &str, event: &serde_json::Value) -> Disposition {
        self.router
            .route(routing_key, &crate::fixtures::body(event))
            .await
    }

    /// The only audit record written so far.
    pub fn single_attempt(&self) -> NotificationAttempt {
        let attempts = self.audit.attempts();
        assert_eq!(attempts.len(), 1, "expected exactly one audit record");
        attempts[0].clone()
    }
}

/// Reconnect policy fast enough for tests.
pub fn fast_reconnect() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay_ms: 5,
        max_delay_ms: 20,
        jitter: 0.0,
        max_attempts: None,
    }
}

/// Connection manager over the in-memory broker.
pub fn broker_manager(connector: Arc<InMemoryConnector>) -> BrokerConnectionManager {
    BrokerConnectionManager::new(
        connector,
        Topology::from_config(&BrokerConfig::default()),
        fast_reconnect(),
    )
}

/// Operational router over `manager` with the two production breakers.
pub fn api_router(manager: BrokerConnectionManager) -> (Router, Vec<Arc<CircuitBreaker>>) {
    let breakers = vec![
        Arc::new(CircuitBreaker::new("delivery", BreakerConfig::default())),
        Arc::new(CircuitBreaker::new("profile", BreakerConfig::default())),
    ];
    let state = AppState::new(manager).with_breakers(breakers.clone());
    (router(state), breakers)
}

/// Polls `condition` until it holds, failing the test after about two seconds.
pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Waits until the manager is consuming again.
pub async fn wait_until_running(manager: &BrokerConnectionManager) {
    wait_for(|| manager.state() == LifecycleState::Running && manager.is_connected()).await;
}
