//! Audit store configuration.

use serde::{Deserialize, Serialize};

/// Audit store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Write attempts to ClickHouse; when off they are only logged
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// ClickHouse HTTP URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Database holding the audit table
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Create the database and table at startup
    #[serde(default = "default_init_schema")]
    pub init_schema: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "notifications".to_string()
}

fn default_init_schema() -> bool {
    true
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            url: default_url(),
            database: default_database(),
            username: None,
            password: None,
            init_schema: default_init_schema(),
        }
    }
}
