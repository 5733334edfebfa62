//! Notification data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery mechanism. Declaration order is the default failover order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[serde(alias = "email")]
    Mail,
    #[serde(alias = "sms")]
    Text,
    #[serde(alias = "telegram", alias = "tg")]
    Bot,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [ChannelKind::Mail, ChannelKind::Text, ChannelKind::Bot];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Mail => "mail",
            ChannelKind::Text => "text",
            ChannelKind::Bot => "bot",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification status. `Scheduled` moves to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Scheduled,
    Sent,
    Error,
}

/// Per-channel destinations of a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destinations {
    /// Postal address for the mail channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Phone number (digits only) for the text-message channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Chat identifier for the bot-message channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl Destinations {
    /// Destination used by a given channel kind.
    pub fn for_kind(&self, kind: ChannelKind) -> Option<&str> {
        match kind {
            ChannelKind::Mail => self.email.as_deref(),
            ChannelKind::Text => self.phone.as_deref(),
            ChannelKind::Bot => self.chat_id.as_deref(),
        }
    }
}

/// One message addressed to one channel-specific recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Envelope {
    pub fn new(recipient: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Outcome of one channel attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Channel that produced this result (`None` for synthetic results).
    pub channel: Option<ChannelKind>,
    pub succeeded: bool,
    pub message: String,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn success(channel: ChannelKind, message: impl Into<String>) -> Self {
        Self {
            channel: Some(channel),
            succeeded: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn failure(channel: ChannelKind, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            channel: Some(channel),
            succeeded: false,
            message: message.into(),
            error: Some(error.into()),
        }
    }

    /// Synthetic failure returned when no channel could be attempted.
    pub fn no_channels() -> Self {
        Self {
            channel: None,
            succeeded: false,
            message: "No delivery channels available".into(),
            error: Some("channel registry is empty".into()),
        }
    }
}

/// A scheduled notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub destinations: Destinations,
    pub message: String,
    /// Target fire time.
    pub fire_at: DateTime<Utc>,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    /// Set once, when the record reaches a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Channel that delivered the notification.
    pub delivered_via: Option<ChannelKind>,
    /// Last failure message when delivery failed.
    pub error: Option<String>,
}

impl Notification {
    pub fn new(destinations: Destinations, message: impl Into<String>, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            destinations,
            message: message.into(),
            fire_at,
            status: NotificationStatus::Scheduled,
            created_at: Utc::now(),
            completed_at: None,
            delivered_via: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != NotificationStatus::Scheduled
    }

    /// Fold a dispatch outcome into the record.
    /// Returns `false` (and changes nothing) if the record is already terminal.
    pub fn complete(&mut self, result: &DeliveryResult) -> bool {
        if self.is_terminal() {
            return false;
        }
        if result.succeeded {
            self.status = NotificationStatus::Sent;
            self.delivered_via = result.channel;
            self.error = None;
        } else {
            self.status = NotificationStatus::Error;
            self.error = Some(
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| result.message.clone()),
            );
        }
        self.completed_at = Some(Utc::now());
        true
    }
}
