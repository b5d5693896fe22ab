//! Domain events consumed from the broker.
//!
//! The routing key selects the event kind; the body is the kind's JSON
//! shape. Every kind shares the [`Envelope`] fields used to find the
//! recipient.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};

use crate::channel::ChannelKind;
use crate::error::{Error, Result};

/// Routing key patterns, one per event kind.
pub mod routing {
    pub const RESOURCE_CREATED: &str = "*.created";
    pub const STATUS_UPDATED: &str = "*.status.updated";
    pub const URGENT_ALERT: &str = "*.urgent.alert";
}

/// Kind of domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ResourceCreated,
    StatusChanged,
    UrgentAlert,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [Self::ResourceCreated, Self::StatusChanged, Self::UrgentAlert];

    /// Maps a concrete routing key (e.g. `complaint.status.updated`) to a kind.
    pub fn from_routing_key(routing_key: &str) -> Option<Self> {
        // Longest suffixes first: `x.status.updated` must not match `.created`.
        if routing_key.ends_with(".status.updated") {
            Some(Self::StatusChanged)
        } else if routing_key.ends_with(".urgent.alert") {
            Some(Self::UrgentAlert)
        } else if routing_key.ends_with(".created") {
            Some(Self::ResourceCreated)
        } else {
            None
        }
    }

    /// Notification type tag recorded in the audit trail.
    pub fn notification_type(&self) -> &'static str {
        match self {
            Self::ResourceCreated => "resource_created",
            Self::StatusChanged => "status_updated",
            Self::UrgentAlert => "urgent_alert",
        }
    }

    /// Queue binding pattern matching every routing key of this kind.
    pub fn binding_pattern(&self) -> &'static str {
        match self {
            Self::ResourceCreated => routing::RESOURCE_CREATED,
            Self::StatusChanged => routing::STATUS_UPDATED,
            Self::UrgentAlert => routing::URGENT_ALERT,
        }
    }
}

/// Recipient fields shared by every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub channel_kind: Option<ChannelKind>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    /// Legacy single identifier, predates `channel_kind`/`recipient_id`.
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Optional location attached to a case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && (self.latitude.is_none() || self.longitude.is_none())
    }
}

/// A new case was filed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCreated {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(deserialize_with = "string_or_number")]
    pub case_id: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub location: Location,
    /// Photo or document attached to the report.
    #[serde(default)]
    pub media_url: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

/// A case moved to a new status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChanged {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(deserialize_with = "string_or_number")]
    pub case_id: String,
    #[serde(default)]
    pub category: Option<String>,
    pub status: String,
    #[serde(default)]
    pub previous_status: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub updated_at: DateTime<FixedOffset>,
}

/// Something needs immediate attention from the tenant's escalation contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgentAlert {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub case_id: Option<String>,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default)]
    pub media_url: Option<String>,
    pub occurred_at: DateTime<FixedOffset>,
}

/// A decoded domain event.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    ResourceCreated(ResourceCreated),
    StatusChanged(StatusChanged),
    UrgentAlert(UrgentAlert),
}

impl DomainEvent {
    /// Decodes a raw broker message.
    ///
    /// Fails with a decode-class error for unknown routing keys, invalid
    /// UTF-8, malformed JSON, or a body that does not match the kind's shape.
    pub fn decode(routing_key: &str, body: &[u8]) -> Result<Self> {
        let kind = EventKind::from_routing_key(routing_key)
            .ok_or_else(|| Error::UnknownRoutingKey(routing_key.to_string()))?;

        let text = std::str::from_utf8(body)
            .map_err(|e| Error::decode(format!("body is not UTF-8: {}", e)))?;

        let event = match kind {
            EventKind::ResourceCreated => Self::ResourceCreated(serde_json::from_str(text)?),
            EventKind::StatusChanged => Self::StatusChanged(serde_json::from_str(text)?),
            EventKind::UrgentAlert => Self::UrgentAlert(serde_json::from_str(text)?),
        };

        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::ResourceCreated(_) => EventKind::ResourceCreated,
            Self::StatusChanged(_) => EventKind::StatusChanged,
            Self::UrgentAlert(_) => EventKind::UrgentAlert,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::ResourceCreated(e) => &e.envelope,
            Self::StatusChanged(e) => &e.envelope,
            Self::UrgentAlert(e) => &e.envelope,
        }
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.envelope().tenant_id.as_deref()
    }

    /// Attachment to forward with the notification, if the event has one.
    pub fn media_url(&self) -> Option<String> {
        let url = match self {
            Self::ResourceCreated(e) => e.media_url.as_deref(),
            Self::StatusChanged(_) => None,
            Self::UrgentAlert(e) => e.media_url.as_deref(),
        };
        url.map(str::trim).filter(|u| !u.is_empty()).map(String::from)
    }

    pub fn case_id(&self) -> Option<&str> {
        match self {
            Self::ResourceCreated(e) => Some(&e.case_id),
            Self::StatusChanged(e) => Some(&e.case_id),
            Self::UrgentAlert(e) => e.case_id.as_deref(),
        }
    }
}

/// Case ids arrive as strings from newer producers and integers from older ones.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
