//! Audit table schema.
//!
//! - append-only MergeTree, one row per attempt, keyed by attempt id
//! - LowCardinality for the closed vocabularies (status, type, channel)
//! - DateTime64(3) for millisecond precision
//! - no TTL: attempts are never expired

use crate::client::{AuditClient, ATTEMPTS_TABLE};
use dispatch_core::{Error, Result};
use tracing::info;

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", database)
}

pub fn create_attempts_table(database: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {database}.{table} (
    attempt_id String,
    routing_key String,
    notification_type LowCardinality(String),
    tenant_id Nullable(String),
    case_id Nullable(String),
    channel_kind LowCardinality(Nullable(String)),
    recipient_id Nullable(String),
    message String,
    status LowCardinality(String),
    provider_message_id Nullable(String),
    detail Nullable(String),
    created_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(created_at)
ORDER BY (created_at, attempt_id)
SETTINGS index_granularity = 8192
"#,
        database = database,
        table = ATTEMPTS_TABLE,
    )
}

/// Creates the database and audit table if missing.
pub async fn init_schema(client: &AuditClient) -> Result<()> {
    let config = client.config();
    let statements = [
        create_database(&config.database),
        create_attempts_table(&config.database),
    ];

    for sql in &statements {
        client
            .inner()
            .query(sql)
            .execute()
            .await
            .map_err(|e| Error::storage(format!("Schema init error: {}", e)))?;
    }

    info!(table = %client.attempts_table(), "Audit schema initialized");
    Ok(())
}
