//! Error taxonomy shared by every Notiflow crate.

use thiserror::Error;

use crate::types::ChannelKind;

#[derive(Debug, Error)]
pub enum NotiflowError {
    /// Required channel configuration is absent or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Establishing or reusing a channel connection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backing protocol rejected or failed the send.
    #[error("Transmission error: {0}")]
    Transmission(String),

    /// No channel survived initialization.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// `deliver` was called without a held connection.
    #[error("Channel {0} used without an acquired connection")]
    NotConnected(ChannelKind),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotiflowError>;
