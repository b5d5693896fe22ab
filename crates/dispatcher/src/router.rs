//! Event router.
//!
//! Per message: decode, resolve the recipient, apply business filters,
//! then either record a skip or render, deliver and record the outcome.
//! Anything that decodes is acknowledged; only undecodable messages are
//! rejected, and without requeue since redelivery cannot fix them.

use async_trait::async_trait;
use audit_store::AuditLogger;
use broker::MessageHandler;
use dispatch_core::{
    resolve_channel, skip_reason, AttemptContext, ChannelKind, Disposition, DomainEvent,
    NotificationAttempt, Resolution, UrgentAlert,
};
use gateway::{DeliveryRequest, EscalationDirectory, MessageDelivery};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::templates;

/// Turns broker messages into notification attempts.
pub struct EventRouter {
    config: RouterConfig,
    notify_statuses: HashSet<String>,
    delivery: Arc<dyn MessageDelivery>,
    directory: Arc<dyn EscalationDirectory>,
    audit: AuditLogger,
}

impl EventRouter {
    pub fn new(
        config: RouterConfig,
        delivery: Arc<dyn MessageDelivery>,
        directory: Arc<dyn EscalationDirectory>,
        audit: AuditLogger,
    ) -> Self {
        let notify_statuses = config
            .notify_statuses
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            config,
            notify_statuses,
            delivery,
            directory,
            audit,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Whether a status change to `status` should reach the recipient.
    pub fn is_notify_worthy(&self, status: &str) -> bool {
        self.notify_statuses.contains(&status.trim().to_lowercase())
    }

    pub async fn route(&self, routing_key: &str, body: &[u8]) -> Disposition {
        let event = match DomainEvent::decode(routing_key, body) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    routing_key = %routing_key,
                    body_len = body.len(),
                    error = %e,
                    "Dropping undecodable event"
                );
                return Disposition::NackDrop;
            }
        };

        let ctx = AttemptContext::new(routing_key, event.kind())
            .with_tenant(non_blank(event.tenant_id()))
            .with_case(non_blank(event.case_id()));

        debug!(
            routing_key = %routing_key,
            kind = event.kind().notification_type(),
            tenant_id = ?ctx.tenant_id,
            case_id = ?ctx.case_id,
            "Routing event"
        );

        let attempt = match &event {
            DomainEvent::UrgentAlert(alert) => self.escalate(ctx, alert).await,
            _ => self.notify_recipient(ctx, &event).await,
        };

        self.audit.record(attempt).await;
        Disposition::Ack
    }

    async fn notify_recipient(&self, ctx: AttemptContext, event: &DomainEvent) -> NotificationAttempt {
        let (channel_kind, recipient_id) = match resolve_channel(event.envelope()) {
            Resolution::Resolved {
                channel_kind,
                recipient_id,
                ..
            } => (channel_kind, recipient_id),
            Resolution::Unresolved { .. } => {
                debug!(routing_key = %ctx.routing_key, "No recipient on event");
                return NotificationAttempt::skipped(ctx, skip_reason::NO_RECIPIENT);
            }
        };
        let ctx = ctx.with_recipient(channel_kind, recipient_id.clone());

        if let DomainEvent::StatusChanged(change) = event {
            if !self.is_notify_worthy(&change.status) {
                debug!(status = %change.status, "Status change is not notify-worthy");
                return NotificationAttempt::skipped(ctx, skip_reason::STATUS_NOT_NOTIFIABLE);
            }
        }

        if !channel_kind.supports_push() {
            debug!(channel_kind = %channel_kind, "Recipient channel does not accept pushes");
            return NotificationAttempt::skipped(ctx, skip_reason::NON_PUSH_CHANNEL);
        }

        let message = templates::render(event, self.config.locale);
        self.deliver(ctx, recipient_id, message, event.media_url()).await
    }

    /// Urgent alerts go to the tenant's escalation contact, never the event's recipient.
    async fn escalate(&self, ctx: AttemptContext, alert: &UrgentAlert) -> NotificationAttempt {
        let recipient = match self
            .directory
            .resolve_escalation_recipient(ctx.tenant_id.as_deref())
            .await
        {
            Some(recipient) => Some(recipient),
            None => non_blank(self.config.default_escalation_recipient.as_deref()),
        };

        let Some(recipient) = recipient else {
            warn!(tenant_id = ?ctx.tenant_id, "No escalation recipient for urgent alert");
            return NotificationAttempt::skipped(ctx, skip_reason::NO_ESCALATION_RECIPIENT);
        };

        let channel_kind = alert
            .envelope
            .channel_kind
            .unwrap_or(ChannelKind::PUSH_DEFAULT);
        let ctx = ctx.with_recipient(channel_kind, recipient.clone());

        if !channel_kind.supports_push() {
            debug!(channel_kind = %channel_kind, "Urgent alert channel does not accept pushes");
            return NotificationAttempt::skipped(ctx, skip_reason::NON_PUSH_CHANNEL);
        }

        let message = templates::render_urgent_alert(alert, self.config.locale);

        if !self.config.urgent_auto_send {
            info!(
                tenant_id = ?ctx.tenant_id,
                recipient = %recipient,
                "Urgent alert not sent, auto-send disabled"
            );
            return NotificationAttempt::skipped_with_message(
                ctx,
                message,
                skip_reason::AUTO_SEND_DISABLED,
            );
        }

        self.deliver(ctx, recipient, message, non_blank(alert.media_url.as_deref()))
            .await
    }

    async fn deliver(
        &self,
        ctx: AttemptContext,
        recipient: String,
        message: String,
        media_url: Option<String>,
    ) -> NotificationAttempt {
        let request = DeliveryRequest::new(recipient, message, ctx.kind.notification_type())
            .with_tenant(ctx.tenant_id.clone())
            .with_media_url(media_url);

        match self.delivery.deliver(&request).await {
            Ok(receipt) => {
                info!(
                    notification_type = %request.notification_type,
                    recipient = %request.recipient,
                    message_id = ?receipt.message_id,
                    attempts = receipt.attempts,
                    "Notification sent"
                );
                NotificationAttempt::sent(ctx, request.message, receipt.message_id)
            }
            Err(e) => {
                warn!(
                    notification_type = %request.notification_type,
                    recipient = %request.recipient,
                    error = %e,
                    "Notification delivery failed"
                );
                NotificationAttempt::failed(ctx, request.message, e.to_string())
            }
        }
    }
}

#[async_trait]
impl MessageHandler for EventRouter {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Disposition {
        self.route(routing_key, body).await
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
