//! Tenant escalation recipient lookup.
//!
//! Looked up once per urgent alert and never cached, so a change in the
//! profile service is picked up on the next alert. Every failure reads as
//! "no override" and the caller falls back to the global default.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use serde::Deserialize;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, warn};
use url::Url;

use crate::circuit_breaker::{BreakerError, CircuitBreaker};
use crate::config::ProfileConfig;
use crate::delivery::api_key_header;
use dispatch_core::{Error, Result};

/// Source of per-tenant escalation recipients.
#[async_trait]
pub trait EscalationDirectory: Send + Sync {
    /// Returns the override for `tenant_id`, or `None` when there is none
    /// or it cannot be determined.
    async fn resolve_escalation_recipient(&self, tenant_id: Option<&str>) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    data: Option<ProfileData>,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    #[serde(default, rename = "escalationRecipient")]
    escalation_recipient: Option<String>,
}

/// Profile service client.
pub struct TenantConfigResolver {
    profile_url: Url,
    api_key: (HeaderName, HeaderValue),
    http_client: reqwest::Client,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl TenantConfigResolver {
    pub fn new(config: &ProfileConfig) -> Result<Self> {
        let profile_url = config.profile_url()?;
        let api_key = api_key_header(&config.api_key_header, &config.api_key)?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            profile_url,
            api_key,
            http_client,
            breaker: None,
        })
    }

    /// Guards lookups with `breaker`; an open circuit reads as "no override".
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    fn lookup_url(&self, tenant_id: &str) -> Url {
        let mut url = self.profile_url.clone();
        url.query_pairs_mut().append_pair("tenant_id", tenant_id);
        url
    }

    /// `Ok(None)` covers answers from a healthy service (404, empty value).
    async fn fetch(&self, tenant_id: &str) -> Result<Option<String>> {
        let url = self.lookup_url(tenant_id);
        debug!(tenant_id = %tenant_id, "Fetching tenant profile");

        let response = self
            .http_client
            .get(url)
            .header(self.api_key.0.clone(), self.api_key.1.clone())
            .send()
            .await
            .map_err(|e| Error::connectivity(format!("Profile service unavailable: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(tenant_id = %tenant_id, "No profile for tenant");
            return Ok(None);
        }
        if status.is_client_error() {
            warn!(tenant_id = %tenant_id, status = %status, "Profile service rejected lookup");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::connectivity(format!(
                "Profile service returned {}",
                status
            )));
        }

        let profile: ProfileResponse = match response.json().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Failed to parse profile response");
                return Ok(None);
            }
        };

        Ok(profile
            .data
            .and_then(|d| d.escalation_recipient)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()))
    }
}

#[async_trait]
impl EscalationDirectory for TenantConfigResolver {
    async fn resolve_escalation_recipient(&self, tenant_id: Option<&str>) -> Option<String> {
        let tenant_id = tenant_id.map(str::trim).filter(|t| !t.is_empty())?;
        metrics().tenant_lookups.inc();

        let result = match &self.breaker {
            Some(breaker) => breaker
                .execute(|| self.fetch(tenant_id))
                .await
                .map_err(|e| match e {
                    BreakerError::Inner(e) => e,
                    other => Error::connectivity(other.to_string()),
                }),
            None => self.fetch(tenant_id).await,
        };

        match result {
            Ok(recipient) => recipient,
            Err(e) => {
                metrics().tenant_lookup_failures.inc();
                warn!(tenant_id = %tenant_id, error = %e, "Tenant escalation lookup failed");
                None
            }
        }
    }
}
