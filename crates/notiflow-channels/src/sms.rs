//! SMS channel — single-request HTTP gateway (smsc.ru REST API).
//!
//! There is no protocol handshake: the "connection" is a pooled HTTP client
//! shared by concurrent sends and dropped when the last holder releases it.

use std::time::Duration;

use async_trait::async_trait;
use notiflow_core::config::SmsChannelConfig;
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::Channel;
use notiflow_core::types::{ChannelKind, DeliveryResult, Envelope};

use crate::connection::{ConnectionStats, SharedConnection};

/// Gateway response format: JSON.
const GATEWAY_FORMAT_JSON: u8 = 3;

/// SMS gateway channel.
pub struct SmsChannel {
    config: SmsChannelConfig,
    connection: SharedConnection<reqwest::Client>,
}

impl SmsChannel {
    pub fn new(config: SmsChannelConfig) -> Result<Self> {
        if config.login.trim().is_empty() || config.password.is_empty() {
            return Err(NotiflowError::Configuration(
                "sms: login and password are required".into(),
            ));
        }
        for endpoint in [&config.endpoint, &config.balance_endpoint] {
            reqwest::Url::parse(endpoint).map_err(|e| {
                NotiflowError::Configuration(format!("sms: invalid endpoint {endpoint}: {e}"))
            })?;
        }
        Ok(Self {
            config,
            connection: SharedConnection::new(ChannelKind::Text),
        })
    }

    async fn establish(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| NotiflowError::Connection(format!("SMS HTTP client: {e}")))
    }

    fn request_body(&self, envelope: &Envelope) -> serde_json::Value {
        let mut body = serde_json::json!({
            "login": self.config.login,
            "psw": self.config.password,
            "phones": envelope.recipient,
            "mes": envelope.body,
            "fmt": GATEWAY_FORMAT_JSON,
        });
        if !self.config.sender.is_empty() {
            body["sender"] = serde_json::Value::String(self.config.sender.clone());
        }
        body
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        self.connection.stats().await
    }
}

/// Gateway error field, if present and non-empty.
fn gateway_error(body: &serde_json::Value) -> Option<String> {
    match body.get("error") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if s.is_empty() => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

#[async_trait]
impl Channel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Text
    }

    async fn acquire(&self) -> Result<()> {
        self.connection.acquire(|| self.establish()).await.map(|_| ())
    }

    async fn release(&self) {
        self.connection.release(|_client| async { Ok(()) }).await;
    }

    async fn test_connectivity(&self) -> bool {
        let Some(client) = self.connection.current().await else {
            return false;
        };
        let response = client
            .get(&self.config.balance_endpoint)
            .query(&[
                ("login", self.config.login.as_str()),
                ("psw", self.config.password.as_str()),
                ("fmt", "3"),
            ])
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                match gateway_error(&body) {
                    None => true,
                    Some(e) => {
                        tracing::warn!("SMS gateway probe rejected: {e}");
                        false
                    }
                }
            }
            Ok(resp) => {
                tracing::warn!("SMS gateway probe returned {}", resp.status());
                false
            }
            Err(e) => {
                tracing::warn!("SMS gateway unreachable: {e}");
                false
            }
        }
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult> {
        let Some(client) = self.connection.current().await else {
            return Err(NotiflowError::NotConnected(ChannelKind::Text));
        };

        let response = match client
            .post(&self.config.endpoint)
            .json(&self.request_body(envelope))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return Ok(DeliveryResult::failure(
                    ChannelKind::Text,
                    format!("SMS send failed: {e}"),
                    e.to_string(),
                ));
            }
        };

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let error = gateway_error(&body);

        if status == reqwest::StatusCode::OK && error.is_none() {
            tracing::info!("📱 SMS sent to: {}", envelope.recipient);
            Ok(DeliveryResult::success(ChannelKind::Text, "SMS sent"))
        } else {
            let reason = error.unwrap_or_else(|| format!("HTTP {status}"));
            Ok(DeliveryResult::failure(
                ChannelKind::Text,
                format!("SMS send failed: {reason}"),
                reason,
            ))
        }
    }
}
