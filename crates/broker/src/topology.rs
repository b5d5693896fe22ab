//! Exchange, queue and binding layout asserted on every (re)connect.

use crate::config::BrokerConfig;

/// What the session declares before consuming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_keys: Vec<String>,
    pub message_ttl_ms: u32,
    pub prefetch: u16,
    pub consumer_tag: String,
}

impl Topology {
    pub fn from_config(config: &BrokerConfig) -> Self {
        let mut routing_keys: Vec<String> = Vec::with_capacity(config.routing_keys.len());
        for key in &config.routing_keys {
            let key = key.trim();
            if !key.is_empty() && !routing_keys.iter().any(|k| k == key) {
                routing_keys.push(key.to_string());
            }
        }

        Self {
            exchange: config.exchange.clone(),
            queue: config.queue.clone(),
            routing_keys,
            message_ttl_ms: config.message_ttl_ms,
            // One message in flight is what keeps handling strictly sequential.
            prefetch: config.prefetch.max(1),
            consumer_tag: config.consumer_tag.clone(),
        }
    }
}

impl From<&BrokerConfig> for Topology {
    fn from(config: &BrokerConfig) -> Self {
        Self::from_config(config)
    }
}
