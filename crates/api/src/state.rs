//! Application state shared across handlers.

use broker::BrokerConnectionManager;
use gateway::CircuitBreaker;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Broker connection (live in production, in-memory in tests)
    pub broker: BrokerConnectionManager,
    /// One breaker per protected dependency
    pub breakers: Arc<Vec<Arc<CircuitBreaker>>>,
}

impl AppState {
    pub fn new(broker: BrokerConnectionManager) -> Self {
        Self {
            broker,
            breakers: Arc::new(Vec::new()),
        }
    }

    pub fn with_breakers(mut self, breakers: Vec<Arc<CircuitBreaker>>) -> Self {
        self.breakers = Arc::new(breakers);
        self
    }

    pub fn breaker(&self, name: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.iter().find(|b| b.name() == name)
    }
}
