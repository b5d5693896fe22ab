//! Audit sinks and the logger that fronts them.

use async_trait::async_trait;
use dispatch_core::{AttemptStatus, NotificationAttempt, Result};
use std::sync::Arc;
use telemetry::{health, metrics};
use tracing::{debug, error, info};

/// Destination for notification attempt records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, attempt: &NotificationAttempt) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Sink used when no audit store is configured: attempts go to the log only.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, attempt: &NotificationAttempt) -> Result<()> {
        info!(
            attempt_id = %attempt.id,
            notification_type = %attempt.notification_type,
            status = attempt.status.as_str(),
            tenant_id = ?attempt.tenant_id,
            recipient_id = ?attempt.recipient_id,
            detail = ?attempt.detail,
            "Notification attempt"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Records attempts; storage failures are logged and counted, never returned.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn record(&self, attempt: NotificationAttempt) {
        match attempt.status {
            AttemptStatus::Sent => metrics().notifications_sent.inc(),
            AttemptStatus::Failed => metrics().notifications_failed.inc(),
            AttemptStatus::Skipped => metrics().notifications_skipped.inc(),
        }

        match self.sink.append(&attempt).await {
            Ok(()) => {
                metrics().audit_writes.inc();
                health().audit.set_healthy();
                debug!(
                    attempt_id = %attempt.id,
                    status = attempt.status.as_str(),
                    sink = self.sink.name(),
                    "Audit record written"
                );
            }
            Err(e) => {
                metrics().audit_write_errors.inc();
                health().audit.set_unhealthy(e.to_string());
                error!(
                    attempt_id = %attempt.id,
                    notification_type = %attempt.notification_type,
                    status = attempt.status.as_str(),
                    sink = self.sink.name(),
                    error = %e,
                    "Failed to write audit record"
                );
            }
        }
    }
}
