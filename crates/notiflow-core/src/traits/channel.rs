//! Channel capability: one delivery mechanism with its own connection lifecycle.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChannelKind, DeliveryResult, Envelope};

/// A delivery channel.
///
/// Connections are reference counted: the first `acquire` establishes the
/// real connection, later ones reuse it, and only the `release` that drops
/// the count to zero tears it down. Every `deliver` must happen between an
/// `acquire` and its matching `release`.
#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Take a reference on the connection, establishing it if none is held.
    /// Fails with `NotiflowError::Connection` and leaves the count untouched
    /// when establishment fails.
    async fn acquire(&self) -> Result<()>;

    /// Drop a reference. Teardown errors are logged, never returned.
    async fn release(&self);

    /// Probe the backing service with the held connection.
    async fn test_connectivity(&self) -> bool;

    /// Send one message over the held connection.
    ///
    /// Transport failures come back as a failed `DeliveryResult`; the only
    /// error is `NotiflowError::NotConnected` when no connection is held.
    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult>;
}
