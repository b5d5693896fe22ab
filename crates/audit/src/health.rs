//! Audit store health checks.

use crate::client::AuditClient;
use telemetry::health;
use tracing::{debug, warn};

/// Check ClickHouse connection health and record it in the health registry.
pub async fn check_connection(client: &AuditClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("Audit store connection healthy");
            health().audit.set_healthy();
            true
        }
        Err(e) => {
            warn!(error = %e, "Audit store health check failed");
            health().audit.set_unhealthy(e.to_string());
            false
        }
    }
}
