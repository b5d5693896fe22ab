//! Audit row writes.

use crate::client::AuditClient;
use crate::sink::AuditSink;
use async_trait::async_trait;
use clickhouse::Row;
use dispatch_core::{Error, NotificationAttempt, Result};
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Flattened attempt row for ClickHouse insertion.
#[derive(Debug, Clone, Row, Serialize)]
pub struct AttemptRow {
    pub attempt_id: String,
    pub routing_key: String,
    pub notification_type: String,
    pub tenant_id: Option<String>,
    pub case_id: Option<String>,
    pub channel_kind: Option<String>,
    pub recipient_id: Option<String>,
    pub message: String,
    pub status: String,
    pub provider_message_id: Option<String>,
    pub detail: Option<String>,
    pub created_at: i64, // milliseconds since epoch
}

impl From<&NotificationAttempt> for AttemptRow {
    fn from(attempt: &NotificationAttempt) -> Self {
        Self {
            attempt_id: attempt.id.to_string(),
            routing_key: attempt.routing_key.clone(),
            notification_type: attempt.notification_type.clone(),
            tenant_id: attempt.tenant_id.clone(),
            case_id: attempt.case_id.clone(),
            channel_kind: attempt.channel_kind.map(|c| c.as_str().to_string()),
            recipient_id: attempt.recipient_id.clone(),
            message: attempt.message.clone(),
            status: attempt.status.as_str().to_string(),
            provider_message_id: attempt.provider_message_id.clone(),
            detail: attempt.detail.clone(),
            created_at: attempt.created_at.timestamp_millis(),
        }
    }
}

/// Inserts one attempt row.
pub async fn insert_attempt(client: &AuditClient, attempt: &NotificationAttempt) -> Result<()> {
    let start = Instant::now();
    let row = AttemptRow::from(attempt);

    let mut insert = client
        .inner()
        .insert(&client.attempts_table())
        .map_err(|e| Error::storage(format!("Insert error: {}", e)))?;

    insert
        .write(&row)
        .await
        .map_err(|e| Error::storage(format!("Write error: {}", e)))?;

    insert
        .end()
        .await
        .map_err(|e| Error::storage(format!("End error: {}", e)))?;

    debug!(
        attempt_id = %row.attempt_id,
        latency_ms = %start.elapsed().as_millis(),
        "Inserted audit row"
    );

    Ok(())
}

/// ClickHouse-backed audit sink.
#[derive(Clone)]
pub struct ClickHouseAuditStore {
    client: AuditClient,
}

impl ClickHouseAuditStore {
    pub fn new(client: AuditClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AuditClient {
        &self.client
    }
}

#[async_trait]
impl AuditSink for ClickHouseAuditStore {
    async fn append(&self, attempt: &NotificationAttempt) -> Result<()> {
        insert_attempt(&self.client, attempt).await
    }

    fn name(&self) -> &'static str {
        "clickhouse"
    }
}
