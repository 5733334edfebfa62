//! # Notiflow Core
//! Shared data model, the `Channel` capability trait, error taxonomy and
//! configuration for the notification workspace.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::NotiflowConfig;
pub use error::{NotiflowError, Result};
pub use traits::Channel;
pub use types::{
    ChannelKind, DeliveryResult, Destinations, Envelope, Notification, NotificationStatus,
};
