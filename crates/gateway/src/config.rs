//! Gateway configuration.

use dispatch_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Delivery API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Base URL of the channel delivery API (`/send` is appended)
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Shared static API key
    #[serde(default)]
    pub api_key: String,
    /// Header carrying the API key
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Per-request timeout in milliseconds
    #[validate(range(min = 1))]
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first attempt on network-level failures
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Backoff unit in milliseconds; retry n waits n * backoff
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Tenant profile lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProfileConfig {
    /// Base URL of the profile service (`/profile` is appended)
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Lookup timeout; escalation must not wait on a slow profile service
    #[validate(range(min = 1, max = 5000))]
    #[serde(default = "default_profile_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_profile_timeout_ms() -> u64 {
    5_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            api_key_header: default_api_key_header(),
            request_timeout_ms: default_request_timeout_ms(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn send_url(&self) -> Result<Url> {
        endpoint(&self.base_url, "send")
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            api_key_header: default_api_key_header(),
            timeout_ms: default_profile_timeout_ms(),
        }
    }
}

impl ProfileConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn profile_url(&self) -> Result<Url> {
        endpoint(&self.base_url, "profile")
    }
}

/// Joins `path` under `base`, keeping any path prefix the base carries.
pub fn endpoint(base: &str, path: &str) -> Result<Url> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }

    Url::parse(&base)
        .and_then(|b| b.join(path))
        .map_err(|e| Error::config(format!("invalid base url {}: {}", base, e)))
}
