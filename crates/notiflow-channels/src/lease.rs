//! Scoped channel acquisition.

use std::sync::Arc;

use notiflow_core::error::Result;
use notiflow_core::traits::Channel;

/// A held reference on a channel's connection.
///
/// Call [`ConnectionLease::release`] on the normal path. A lease dropped
/// while still held (panic, cancelled future) schedules the release on the
/// current tokio runtime.
pub struct ConnectionLease {
    channel: Option<Arc<dyn Channel>>,
}

impl ConnectionLease {
    pub async fn acquire(channel: Arc<dyn Channel>) -> Result<Self> {
        channel.acquire().await?;
        Ok(Self {
            channel: Some(channel),
        })
    }

    pub async fn release(mut self) {
        if let Some(channel) = self.channel.take() {
            channel.release().await;
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(channel = %channel.kind(), "Lease dropped while held, releasing in background");
                runtime.spawn(async move {
                    channel.release().await;
                });
            }
            Err(_) => {
                tracing::error!(channel = %channel.kind(), "Lease dropped outside a runtime, connection reference leaked");
            }
        }
    }
}
