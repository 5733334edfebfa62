//! Dispatch manager: owns the channel registry and runs ordered failover.
//!
//! Lifecycle: `Uninitialized → Initializing → Ready | Failed`. Both end states
//! are terminal. The registry is written once during initialization and only
//! read afterwards, so concurrent dispatches never lock it.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, OnceLock};

use futures::FutureExt;
use notiflow_core::config::NotiflowConfig;
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::traits::Channel;
use notiflow_core::types::{ChannelKind, DeliveryResult, Destinations, Envelope};
use serde::Serialize;

use crate::lease::ConnectionLease;

/// Constructs a channel instance. Failure excludes the kind from the registry.
pub type ChannelBuilder = Box<dyn Fn() -> Result<Arc<dyn Channel>> + Send + Sync>;

const DEFAULT_SUBJECT: &str = "notify";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

pub struct DispatchManager {
    builders: Vec<(ChannelKind, ChannelBuilder)>,
    subject: String,
    state: Mutex<ManagerState>,
    init_lock: tokio::sync::Mutex<()>,
    registry: OnceLock<Vec<Arc<dyn Channel>>>,
}

impl DispatchManager {
    /// Builders are attempted, and later dispatched, in the given order.
    pub fn with_builders(builders: Vec<(ChannelKind, ChannelBuilder)>) -> Self {
        Self {
            builders,
            subject: DEFAULT_SUBJECT.into(),
            state: Mutex::new(ManagerState::Uninitialized),
            init_lock: tokio::sync::Mutex::new(()),
            registry: OnceLock::new(),
        }
    }

    pub fn from_config(config: &NotiflowConfig) -> Self {
        let mut manager = Self::with_builders(crate::channel_builders(config));
        if let Some(email) = &config.channel.email {
            manager.subject = email.subject.clone();
        }
        manager
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ManagerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Kinds in the registry, in dispatch order. Empty until ready.
    pub fn registered_kinds(&self) -> Vec<ChannelKind> {
        self.registry
            .get()
            .map(|channels| channels.iter().map(|c| c.kind()).collect())
            .unwrap_or_default()
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<Arc<dyn Channel>> {
        self.registry
            .get()?
            .iter()
            .find(|c| c.kind() == kind)
            .cloned()
    }

    /// Build and probe every configured channel, keeping the reachable ones.
    ///
    /// A no-op once ready. Fails with `NotiflowError::Initialization` when no
    /// channel survives, after which the manager stays failed.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        match self.state() {
            ManagerState::Ready => return Ok(()),
            ManagerState::Failed => {
                return Err(NotiflowError::Initialization(
                    "dispatch manager failed to initialize earlier".into(),
                ));
            }
            ManagerState::Uninitialized | ManagerState::Initializing => {}
        }
        self.set_state(ManagerState::Initializing);

        let mut registry: Vec<Arc<dyn Channel>> = Vec::new();
        for (kind, build) in &self.builders {
            let channel = match build() {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::warn!(channel = %kind, error = %e, "Channel excluded: construction failed");
                    continue;
                }
            };
            match probe(&channel).await {
                Ok(true) => {
                    tracing::info!(channel = %kind, "Channel ready");
                    registry.push(channel);
                }
                Ok(false) => {
                    tracing::warn!(channel = %kind, "Channel excluded: connectivity probe failed");
                }
                Err(e) => {
                    tracing::warn!(channel = %kind, error = %e, "Channel excluded: connection failed");
                }
            }
        }

        if registry.is_empty() {
            self.set_state(ManagerState::Failed);
            return Err(NotiflowError::Initialization(
                "no delivery channel passed its connectivity probe".into(),
            ));
        }

        tracing::info!(
            "🚀 Dispatch manager ready with {} channel(s): {:?}",
            registry.len(),
            registry.iter().map(|c| c.kind()).collect::<Vec<_>>()
        );
        // Guarded by `init_lock` and the state check, so this is the only set.
        let _ = self.registry.set(registry);
        self.set_state(ManagerState::Ready);
        Ok(())
    }

    /// Try each registered channel in order until one succeeds.
    ///
    /// Returns the first successful result, otherwise the last failure (or a
    /// synthetic failure when there is nothing to try). Never returns an error:
    /// every per-channel problem becomes a failed attempt.
    pub async fn dispatch(&self, message: &str, destinations: &Destinations) -> DeliveryResult {
        let Some(channels) = self.registry.get() else {
            tracing::warn!(state = ?self.state(), "Dispatch requested with no channel registry");
            return DeliveryResult::no_channels();
        };

        let mut last = None;
        let mut previous: Option<ChannelKind> = None;
        for channel in channels {
            let kind = channel.kind();
            let Some(recipient) = destinations.for_kind(kind) else {
                tracing::debug!(channel = %kind, "Skipping channel: no destination");
                last = Some(DeliveryResult::failure(
                    kind,
                    format!("No {kind} destination"),
                    "missing destination",
                ));
                continue;
            };

            let envelope = Envelope::new(recipient, self.subject.as_str(), message);
            let result = attempt(channel, &envelope).await;
            if result.succeeded {
                if let Some(from) = previous {
                    tracing::info!("🔄 Failover: {} → {} (success)", from, kind);
                }
                return result;
            }

            tracing::warn!(
                channel = %kind,
                error = result.error.as_deref().unwrap_or("unknown"),
                "⚠️ Delivery attempt failed: {}",
                result.message
            );
            previous = Some(kind);
            last = Some(result);
        }

        last.unwrap_or_else(DeliveryResult::no_channels)
    }
}

/// Scoped acquire → probe → release. The lease is released on every path.
async fn probe(channel: &Arc<dyn Channel>) -> Result<bool> {
    let lease = ConnectionLease::acquire(Arc::clone(channel)).await?;
    let reachable = AssertUnwindSafe(channel.test_connectivity())
        .catch_unwind()
        .await
        .unwrap_or(false);
    lease.release().await;
    Ok(reachable)
}

/// One delivery attempt; the connection is released before the result is looked at.
async fn attempt(channel: &Arc<dyn Channel>, envelope: &Envelope) -> DeliveryResult {
    let kind = channel.kind();
    let lease = match ConnectionLease::acquire(Arc::clone(channel)).await {
        Ok(lease) => lease,
        Err(e) => {
            return DeliveryResult::failure(kind, format!("{kind} connection failed"), e.to_string());
        }
    };

    let outcome = AssertUnwindSafe(channel.deliver(envelope)).catch_unwind().await;
    lease.release().await;

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e @ NotiflowError::NotConnected(_))) => {
            tracing::error!(channel = %kind, "Contract violation: {e}");
            DeliveryResult::failure(kind, format!("{kind} delivery failed"), e.to_string())
        }
        Ok(Err(e)) => DeliveryResult::failure(kind, format!("{kind} delivery failed"), e.to_string()),
        Err(_) => DeliveryResult::failure(
            kind,
            format!("{kind} delivery failed"),
            "channel panicked during delivery",
        ),
    }
}
