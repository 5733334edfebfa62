//! Telegram Bot channel — message sending via Bot API.

use std::time::Duration;

use async_trait::async_trait;
use notiflow_core::config::TelegramChannelConfig;
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::Channel;
use notiflow_core::types::{ChannelKind, DeliveryResult, Envelope};
use serde::Deserialize;

use crate::connection::{ConnectionStats, SharedConnection};

/// Bot session keyed by the bot token.
pub struct BotSession {
    client: reqwest::Client,
    base_url: String,
}

impl BotSession {
    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| NotiflowError::Connection(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| NotiflowError::Connection(format!("Invalid getMe response: {e}")))?;
        if !body.ok {
            return Err(NotiflowError::Connection(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| NotiflowError::Connection("No bot info".into()))
    }

    /// Send a text message.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotiflowError::Transmission(format!("sendMessage failed: {e}")))?;

        let status = response.status();
        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| NotiflowError::Transmission(format!("Invalid send response ({status}): {e}")))?;

        if !result.ok {
            return Err(NotiflowError::Transmission(
                result
                    .description
                    .unwrap_or_else(|| format!("HTTP {status}")),
            ));
        }
        Ok(())
    }
}

/// Telegram Bot channel.
pub struct TelegramChannel {
    config: TelegramChannelConfig,
    connection: SharedConnection<BotSession>,
}

impl TelegramChannel {
    pub fn new(config: TelegramChannelConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(NotiflowError::Configuration("telegram: bot_token is required".into()));
        }
        reqwest::Url::parse(&config.api_base).map_err(|e| {
            NotiflowError::Configuration(format!("telegram: invalid api_base: {e}"))
        })?;
        Ok(Self {
            config,
            connection: SharedConnection::new(ChannelKind::Bot),
        })
    }

    async fn establish(&self) -> Result<BotSession> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| NotiflowError::Connection(format!("Telegram HTTP client: {e}")))?;
        Ok(BotSession {
            client,
            base_url: format!(
                "{}/bot{}",
                self.config.api_base.trim_end_matches('/'),
                self.config.bot_token
            ),
        })
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        self.connection.stats().await
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Bot
    }

    async fn acquire(&self) -> Result<()> {
        self.connection.acquire(|| self.establish()).await.map(|_| ())
    }

    async fn release(&self) {
        self.connection.release(|_session| async { Ok(()) }).await;
    }

    async fn test_connectivity(&self) -> bool {
        let Some(session) = self.connection.current().await else {
            return false;
        };
        match session.get_me().await {
            Ok(me) => {
                tracing::info!(
                    "Telegram bot: @{} ({})",
                    me.username.as_deref().unwrap_or("unknown"),
                    me.first_name
                );
                true
            }
            Err(e) => {
                tracing::warn!("Telegram probe failed: {e}");
                false
            }
        }
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult> {
        let Some(session) = self.connection.current().await else {
            return Err(NotiflowError::NotConnected(ChannelKind::Bot));
        };

        match session.send_message(&envelope.recipient, &envelope.body).await {
            Ok(()) => {
                tracing::info!("✅ Telegram message sent to chat {}", envelope.recipient);
                Ok(DeliveryResult::success(ChannelKind::Bot, "Telegram message sent"))
            }
            Err(e) => Ok(DeliveryResult::failure(
                ChannelKind::Bot,
                format!("Telegram send failed: {e}"),
                e.to_string(),
            )),
        }
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}
