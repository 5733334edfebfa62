//! Incoming notification request and its validation rules.

use chrono::{DateTime, NaiveDateTime, Utc};
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::types::{Destinations, Notification};
use serde::{Deserialize, Deserializer};

const DEFAULT_MESSAGE: &str = "Reminder";
const MIN_PHONE_DIGITS: usize = 10;

/// Payload of a schedule request.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Telegram chat id.
    #[serde(default)]
    pub tg_id: Option<String>,
    /// RFC 3339, or a naive timestamp read as UTC.
    #[serde(deserialize_with = "fire_time")]
    pub notification_date: DateTime<Utc>,
    #[serde(default)]
    pub message: Option<String>,
}

impl NotificationRequest {
    /// Validate against `now` and build a `scheduled` record.
    pub fn into_notification(self, now: DateTime<Utc>) -> Result<Notification> {
        if self.notification_date <= now {
            return Err(NotiflowError::Validation(
                "notification_date must be in the future".into(),
            ));
        }

        let destinations = Destinations {
            email: non_empty(self.email).map(validate_email).transpose()?,
            phone: non_empty(self.phone).map(normalize_phone).transpose()?,
            chat_id: non_empty(self.tg_id).map(validate_chat_id).transpose()?,
        };
        if destinations == Destinations::default() {
            return Err(NotiflowError::Validation(
                "at least one of phone, email or tg_id is required".into(),
            ));
        }

        let message = non_empty(self.message).unwrap_or_else(|| DEFAULT_MESSAGE.into());
        Ok(Notification::new(destinations, message, self.notification_date))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FireTime {
    Zoned(DateTime<Utc>),
    Naive(NaiveDateTime),
}

fn fire_time<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error> {
    Ok(match FireTime::deserialize(deserializer)? {
        FireTime::Zoned(at) => at,
        FireTime::Naive(at) => at.and_utc(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Strip everything but digits.
pub fn normalize_phone(raw: String) -> Result<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(NotiflowError::Validation(format!(
            "phone must contain at least {MIN_PHONE_DIGITS} digits"
        )));
    }
    Ok(digits)
}

fn validate_chat_id(raw: String) -> Result<String> {
    if !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(NotiflowError::Validation("tg_id must be numeric".into()));
    }
    Ok(raw)
}

/// Same parser the mail channel uses when building the message.
fn validate_email(raw: String) -> Result<String> {
    raw.parse::<lettre::Address>()
        .map_err(|e| NotiflowError::Validation(format!("invalid email address {raw}: {e}")))?;
    Ok(raw)
}
