//! ClickHouse client wrapper.

use crate::config::AuditConfig;
use clickhouse::Client;
use dispatch_core::{Error, Result};
use tracing::info;

/// Audit table name inside the configured database.
pub const ATTEMPTS_TABLE: &str = "notification_attempts";

/// ClickHouse client bound to the audit database.
#[derive(Clone)]
pub struct AuditClient {
    inner: Client,
    config: AuditConfig,
}

impl AuditClient {
    pub fn new(config: AuditConfig) -> Result<Self> {
        if !is_identifier(&config.database) {
            return Err(Error::config(format!(
                "invalid audit database name: {:?}",
                config.database
            )));
        }

        let mut client = Client::default().with_url(&config.url);

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        info!(
            url = %config.url,
            database = %config.database,
            "Created audit store client"
        );

        Ok(Self {
            inner: client,
            config,
        })
    }

    pub fn inner(&self) -> &Client {
        &self.inner
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// `database.notification_attempts`
    pub fn attempts_table(&self) -> String {
        format!("{}.{}", self.config.database, ATTEMPTS_TABLE)
    }
}

/// Database names are spliced into DDL, so only plain identifiers are allowed.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
