//! Router configuration.

use crate::templates::Locale;
use serde::{Deserialize, Serialize};

/// Business rules applied between decoding and delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Statuses that trigger a notification on status change (case-insensitive)
    #[serde(default = "default_notify_statuses")]
    pub notify_statuses: Vec<String>,
    /// Send urgent alerts; when off they are audited as skipped
    #[serde(default)]
    pub urgent_auto_send: bool,
    /// Escalation recipient used when the tenant has no override
    #[serde(default)]
    pub default_escalation_recipient: Option<String>,
    /// Language of rendered messages
    #[serde(default)]
    pub locale: Locale,
}

fn default_notify_statuses() -> Vec<String> {
    ["DONE", "PROCESS", "REJECTED", "selesai", "proses", "ditolak"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            notify_statuses: default_notify_statuses(),
            urgent_auto_send: false,
            default_escalation_recipient: None,
            locale: Locale::default(),
        }
    }
}
