//! Notification attempt records for the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelKind;
use crate::events::EventKind;

/// Reasons recorded on `skipped` attempts.
pub mod skip_reason {
    pub const NO_RECIPIENT: &str = "no recipient resolved";
    pub const NON_PUSH_CHANNEL: &str = "channel does not support push";
    pub const STATUS_NOT_NOTIFIABLE: &str = "status is not notify-worthy";
    pub const NO_ESCALATION_RECIPIENT: &str = "no escalation recipient configured";
    pub const AUTO_SEND_DISABLED: &str = "auto-send disabled";
}

/// Final outcome of one notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Sent,
    Failed,
    Skipped,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// What is known about an event at the delivery decision point.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptContext {
    pub routing_key: String,
    pub kind: EventKind,
    pub tenant_id: Option<String>,
    pub case_id: Option<String>,
    pub channel_kind: Option<ChannelKind>,
    pub recipient_id: Option<String>,
}

impl AttemptContext {
    pub fn new(routing_key: impl Into<String>, kind: EventKind) -> Self {
        Self {
            routing_key: routing_key.into(),
            kind,
            tenant_id: None,
            case_id: None,
            channel_kind: None,
            recipient_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_case(mut self, case_id: Option<String>) -> Self {
        self.case_id = case_id;
        self
    }

    pub fn with_recipient(mut self, channel_kind: ChannelKind, recipient_id: impl Into<String>) -> Self {
        self.channel_kind = Some(channel_kind);
        self.recipient_id = Some(recipient_id.into());
        self
    }
}

/// One row of the append-only audit trail.
///
/// Built once through [`NotificationAttempt::sent`], [`NotificationAttempt::failed`]
/// or [`NotificationAttempt::skipped`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub id: Uuid,
    pub routing_key: String,
    pub notification_type: String,
    pub tenant_id: Option<String>,
    pub case_id: Option<String>,
    pub channel_kind: Option<ChannelKind>,
    pub recipient_id: Option<String>,
    /// Rendered text; empty when skipped before rendering.
    pub message: String,
    pub status: AttemptStatus,
    pub provider_message_id: Option<String>,
    /// Error detail for `failed`, reason for `skipped`.
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationAttempt {
    fn build(
        ctx: AttemptContext,
        status: AttemptStatus,
        message: String,
        provider_message_id: Option<String>,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_type: ctx.kind.notification_type().to_string(),
            routing_key: ctx.routing_key,
            tenant_id: ctx.tenant_id,
            case_id: ctx.case_id,
            channel_kind: ctx.channel_kind,
            recipient_id: ctx.recipient_id,
            message,
            status,
            provider_message_id,
            detail,
            created_at: Utc::now(),
        }
    }

    pub fn sent(ctx: AttemptContext, message: impl Into<String>, provider_message_id: Option<String>) -> Self {
        Self::build(ctx, AttemptStatus::Sent, message.into(), provider_message_id, None)
    }

    pub fn failed(ctx: AttemptContext, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self::build(ctx, AttemptStatus::Failed, message.into(), None, Some(error.into()))
    }

    pub fn skipped(ctx: AttemptContext, reason: impl Into<String>) -> Self {
        Self::build(ctx, AttemptStatus::Skipped, String::new(), None, Some(reason.into()))
    }

    /// Skipped after rendering, so the audit keeps the text that would have gone out.
    pub fn skipped_with_message(
        ctx: AttemptContext,
        message: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::build(ctx, AttemptStatus::Skipped, message.into(), None, Some(reason.into()))
    }
}
