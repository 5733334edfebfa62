//! Email channel — authenticated SMTP session via async lettre.
//!
//! The connection is a pooled `AsyncSmtpTransport`; establishing it opens a
//! session, authenticates and issues a NOOP so bad credentials fail at
//! acquire time rather than on the first send.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use notiflow_core::config::EmailChannelConfig;
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::Channel;
use notiflow_core::types::{ChannelKind, DeliveryResult, Envelope};

use crate::connection::{ConnectionStats, SharedConnection};

type Mailer = AsyncSmtpTransport<Tokio1Executor>;

/// Email channel.
pub struct EmailChannel {
    config: EmailChannelConfig,
    from: Mailbox,
    connection: SharedConnection<Mailer>,
}

impl EmailChannel {
    pub fn new(config: EmailChannelConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(NotiflowError::Configuration("email: host is required".into()));
        }
        if config.username.trim().is_empty() {
            return Err(NotiflowError::Configuration(
                "email: username is required (used as sender)".into(),
            ));
        }
        let from: Mailbox = config
            .username
            .parse()
            .map_err(|e| NotiflowError::Configuration(format!("email: invalid sender address: {e}")))?;

        Ok(Self {
            config,
            from,
            connection: SharedConnection::new(ChannelKind::Mail),
        })
    }

    fn build_transport(&self) -> Result<Mailer> {
        let builder = if self.config.use_tls {
            Mailer::relay(&self.config.host)
        } else {
            Mailer::starttls_relay(&self.config.host)
        }
        .map_err(|e| NotiflowError::Connection(format!("SMTP relay {}: {e}", self.config.host)))?;

        let mut builder = builder
            .port(self.config.port)
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)));

        if !self.config.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }
        Ok(builder.build())
    }

    async fn establish(&self) -> Result<Mailer> {
        let mailer = self.build_transport()?;
        match mailer.test_connection().await {
            Ok(true) => {
                tracing::info!("📧 SMTP session opened: {}:{}", self.config.host, self.config.port);
                Ok(mailer)
            }
            Ok(false) => Err(NotiflowError::Connection(format!(
                "SMTP server {}:{} did not answer NOOP",
                self.config.host, self.config.port
            ))),
            Err(e) => Err(NotiflowError::Connection(format!(
                "SMTP connect {}:{}: {e}",
                self.config.host, self.config.port
            ))),
        }
    }

    /// Compose a plain-text message from the configured sender.
    /// `envelope.recipient` may hold several comma-separated addresses.
    pub fn build_message(&self, envelope: &Envelope) -> Result<LettreMessage> {
        let subject = if envelope.subject.is_empty() {
            self.config.subject.as_str()
        } else {
            envelope.subject.as_str()
        };

        let mut builder = LettreMessage::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);

        let mut recipients = 0;
        for addr in envelope.recipient.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let to: Mailbox = addr
                .parse()
                .map_err(|e| NotiflowError::Transmission(format!("Invalid recipient {addr}: {e}")))?;
            builder = builder.to(to);
            recipients += 1;
        }
        if recipients == 0 {
            return Err(NotiflowError::Transmission("No recipient address".into()));
        }

        builder
            .body(envelope.body.clone())
            .map_err(|e| NotiflowError::Transmission(format!("Build email: {e}")))
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        self.connection.stats().await
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Mail
    }

    async fn acquire(&self) -> Result<()> {
        self.connection.acquire(|| self.establish()).await.map(|_| ())
    }

    async fn release(&self) {
        // Dropping the last transport handle closes its pooled sessions.
        self.connection.release(|_mailer| async { Ok(()) }).await;
    }

    async fn test_connectivity(&self) -> bool {
        let Some(mailer) = self.connection.current().await else {
            return false;
        };
        match mailer.test_connection().await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("SMTP probe failed: {e}");
                false
            }
        }
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult> {
        let Some(mailer) = self.connection.current().await else {
            return Err(NotiflowError::NotConnected(ChannelKind::Mail));
        };

        let email = match self.build_message(envelope) {
            Ok(email) => email,
            Err(e) => {
                return Ok(DeliveryResult::failure(
                    ChannelKind::Mail,
                    "Email send failed",
                    e.to_string(),
                ));
            }
        };

        match mailer.send(email).await {
            Ok(_) => {
                tracing::info!("📤 Email sent to: {}", envelope.recipient);
                Ok(DeliveryResult::success(ChannelKind::Mail, "Email sent"))
            }
            Err(e) => Ok(DeliveryResult::failure(
                ChannelKind::Mail,
                format!("Email send failed: {e}"),
                e.to_string(),
            )),
        }
    }
}
