//! Delivery channels and recipient resolution.

use serde::{Deserialize, Serialize};

use crate::events::Envelope;

/// Channel a recipient is reachable on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Messaging channel that accepts pushed messages.
    Messenger,
    /// Web portal; the user reads updates when they visit.
    Web,
    /// Any channel this service does not know about.
    #[serde(other)]
    Unknown,
}

impl ChannelKind {
    /// Channel used when an event only carries a legacy identifier.
    pub const PUSH_DEFAULT: ChannelKind = ChannelKind::Messenger;

    pub fn supports_push(&self) -> bool {
        matches!(self, Self::Messenger)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messenger => "messenger",
            Self::Web => "web",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving who an event should be sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        tenant_id: Option<String>,
        channel_kind: ChannelKind,
        recipient_id: String,
    },
    Unresolved {
        tenant_id: Option<String>,
    },
}

impl Resolution {
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Self::Resolved { tenant_id, .. } | Self::Unresolved { tenant_id } => {
                tenant_id.as_deref()
            }
        }
    }
}

/// Resolves the recipient of an event from its envelope.
///
/// Precedence:
/// 1. `recipient_id`, on `channel_kind` (push default when absent)
/// 2. legacy `phone_number`, on `channel_kind` (push default when absent)
/// 3. unresolved
///
/// Blank identifiers count as absent.
pub fn resolve_channel(envelope: &Envelope) -> Resolution {
    let tenant_id = non_blank(envelope.tenant_id.as_deref());

    if let Some(recipient_id) = non_blank(envelope.recipient_id.as_deref()) {
        return Resolution::Resolved {
            tenant_id,
            channel_kind: envelope.channel_kind.unwrap_or(ChannelKind::PUSH_DEFAULT),
            recipient_id,
        };
    }

    if let Some(phone) = non_blank(envelope.phone_number.as_deref()) {
        return Resolution::Resolved {
            tenant_id,
            channel_kind: envelope.channel_kind.unwrap_or(ChannelKind::PUSH_DEFAULT),
            recipient_id: phone,
        };
    }

    Resolution::Unresolved { tenant_id }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
