//! # Notiflow Channels
//! Delivery channel implementations and the failover dispatch manager.
//!
//! Each channel owns a reference-counted connection: concurrent deliveries
//! share one live session, and the session is torn down once idle.

pub mod connection;
pub mod email;
pub mod lease;
pub mod manager;
pub mod sms;
pub mod telegram;

use std::sync::Arc;

use notiflow_core::config::{ChannelConfig, NotiflowConfig};
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::Channel;
use notiflow_core::types::ChannelKind;

pub use connection::{ConnectionStats, SharedConnection};
pub use lease::ConnectionLease;
pub use manager::{ChannelBuilder, DispatchManager, ManagerState};

/// Create a channel of the given kind from configuration.
/// A kind without a configuration section is a configuration error.
pub fn create_channel(kind: ChannelKind, config: &ChannelConfig) -> Result<Arc<dyn Channel>> {
    let not_configured = || NotiflowError::Configuration(format!("{kind} channel is not configured"));
    match kind {
        ChannelKind::Mail => {
            let cfg = config.email.clone().ok_or_else(not_configured)?;
            Ok(Arc::new(email::EmailChannel::new(cfg)?))
        }
        ChannelKind::Text => {
            let cfg = config.sms.clone().ok_or_else(not_configured)?;
            Ok(Arc::new(sms::SmsChannel::new(cfg)?))
        }
        ChannelKind::Bot => {
            let cfg = config.telegram.clone().ok_or_else(not_configured)?;
            Ok(Arc::new(telegram::TelegramChannel::new(cfg)?))
        }
    }
}

/// Builders for every kind in the configured failover order.
pub fn channel_builders(config: &NotiflowConfig) -> Vec<(ChannelKind, ChannelBuilder)> {
    config
        .dispatch
        .effective_order()
        .into_iter()
        .map(|kind| {
            let channels = config.channel.clone();
            let builder: ChannelBuilder = Box::new(move || create_channel(kind, &channels));
            (kind, builder)
        })
        .collect()
}
