//! What to do with a broker message once it has been handled.

use serde::{Deserialize, Serialize};

/// Settlement instruction returned by a message handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Processed; remove from the queue.
    Ack,
    /// Transient failure; put back on the queue for redelivery.
    NackRequeue,
    /// Structurally invalid; redelivery can never succeed.
    NackDrop,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::NackRequeue => "nack_requeue",
            Self::NackDrop => "nack_drop",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
