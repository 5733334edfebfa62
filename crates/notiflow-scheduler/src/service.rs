//! Notification service: acceptance, deferred delivery and inspection.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use notiflow_channels::DispatchManager;
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::types::{Notification, NotificationStatus};

use crate::bridge::{JobCallback, SchedulingBridge};
use crate::request::NotificationRequest;
use crate::store::NotificationStore;

/// Ties the store, the scheduling bridge and the dispatch manager together.
pub struct NotificationService {
    manager: Arc<DispatchManager>,
    store: Arc<dyn NotificationStore>,
    bridge: Arc<dyn SchedulingBridge>,
}

impl NotificationService {
    pub fn new(
        manager: Arc<DispatchManager>,
        store: Arc<dyn NotificationStore>,
        bridge: Arc<dyn SchedulingBridge>,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            store,
            bridge,
        })
    }

    pub fn manager(&self) -> &Arc<DispatchManager> {
        &self.manager
    }

    fn delivery_job(self: &Arc<Self>, id: &str) -> JobCallback {
        let service = Arc::clone(self);
        let id = id.to_string();
        Box::new(move || {
            async move {
                if let Err(e) = service.deliver_now(&id).await {
                    tracing::error!(notification_id = %id, "Scheduled delivery failed: {e}");
                }
            }
            .boxed()
        })
    }

    /// Validate, store as `scheduled` and register with the scheduling bridge.
    pub async fn accept_notification(self: &Arc<Self>, request: NotificationRequest) -> Result<Notification> {
        let notification = request.into_notification(Utc::now())?;
        let id = notification.id.clone();

        self.store.insert(notification.clone()).await?;
        if let Err(e) = self
            .bridge
            .schedule_at(&id, notification.fire_at, self.delivery_job(&id))
        {
            self.store.remove(&id).await?;
            return Err(e);
        }

        tracing::info!(
            notification_id = %id,
            fire_at = %notification.fire_at,
            "📝 Notification accepted"
        );
        Ok(notification)
    }

    /// Dispatch a stored notification now and record the outcome.
    /// A record that already reached a terminal status is returned untouched.
    pub async fn deliver_now(&self, id: &str) -> Result<Notification> {
        let notification = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| NotiflowError::NotFound(format!("notification {id}")))?;
        if notification.is_terminal() {
            tracing::debug!(notification_id = %id, "Already delivered, skipping");
            return Ok(notification);
        }

        let result = self
            .manager
            .dispatch(&notification.message, &notification.destinations)
            .await;
        let updated = self.store.complete(id, &result).await?;

        match updated.status {
            NotificationStatus::Sent => tracing::info!(
                notification_id = %id,
                channel = ?updated.delivered_via,
                "✅ Notification delivered"
            ),
            _ => tracing::warn!(
                notification_id = %id,
                error = updated.error.as_deref().unwrap_or("unknown"),
                "❌ Notification failed on every channel"
            ),
        }
        Ok(updated)
    }

    pub async fn list_notifications(&self) -> Result<Vec<Notification>> {
        self.store.list().await
    }

    pub async fn get(&self, id: &str) -> Result<Notification> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| NotiflowError::NotFound(format!("notification {id}")))
    }

    /// Re-register every stored `scheduled` record. Returns how many were restored.
    pub async fn restore(self: &Arc<Self>) -> Result<usize> {
        let mut restored = 0;
        for notification in self.store.list().await? {
            if notification.is_terminal() {
                continue;
            }
            match self
                .bridge
                .schedule_at(&notification.id, notification.fire_at, self.delivery_job(&notification.id))
            {
                Ok(()) => restored += 1,
                Err(e) => {
                    tracing::warn!(notification_id = %notification.id, "Could not restore job: {e}")
                }
            }
        }
        if restored > 0 {
            tracing::info!("⏰ Restored {restored} scheduled notification(s)");
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::TokioScheduler;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use notiflow_channels::ChannelBuilder;
    use notiflow_core::traits::Channel;
    use notiflow_core::types::{ChannelKind, DeliveryResult, Destinations, Envelope};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingChannel {
        kind: ChannelKind,
        succeed: bool,
        seen: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn acquire(&self) -> Result<()> {
            Ok(())
        }

        async fn release(&self) {}

        async fn test_connectivity(&self) -> bool {
            true
        }

        async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult> {
            self.seen.lock().unwrap().push(envelope.clone());
            Ok(if self.succeed {
                DeliveryResult::success(self.kind, "sent")
            } else {
                DeliveryResult::failure(self.kind, "failed", format!("{} down", self.kind))
            })
        }
    }

    fn channel(kind: ChannelKind, succeed: bool) -> Arc<RecordingChannel> {
        Arc::new(RecordingChannel {
            kind,
            succeed,
            seen: Mutex::new(Vec::new()),
        })
    }

    async fn manager(channels: &[&Arc<RecordingChannel>]) -> Arc<DispatchManager> {
        let builders = channels
            .iter()
            .map(|c| {
                let kind = c.kind;
                let c = Arc::clone(c);
                let build: ChannelBuilder = Box::new(move || {
                    let channel: Arc<dyn Channel> = c.clone();
                    Ok(channel)
                });
                (kind, build)
            })
            .collect();
        let manager = DispatchManager::with_builders(builders);
        manager.initialize().await.unwrap();
        Arc::new(manager)
    }

    fn service(
        manager: Arc<DispatchManager>,
        store: Arc<MemoryStore>,
        scheduler: &TokioScheduler,
    ) -> Arc<NotificationService> {
        NotificationService::new(manager, store, Arc::new(scheduler.clone()))
    }

    fn request(in_ms: i64) -> NotificationRequest {
        NotificationRequest {
            phone: Some("8 (999) 123-45-67".into()),
            email: Some("user@example.com".into()),
            tg_id: Some("123456".into()),
            notification_date: Utc::now() + chrono::Duration::milliseconds(in_ms),
            message: Some("Dentist at 10".into()),
        }
    }

    async fn wait_for_status(svc: &NotificationService, id: &str) -> Notification {
        for _ in 0..100 {
            let n = svc.get(id).await.unwrap();
            if n.is_terminal() {
                return n;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("notification {id} never completed");
    }

    #[tokio::test]
    async fn test_accepted_notification_is_delivered_via_failover() {
        let mail = channel(ChannelKind::Mail, false);
        let text = channel(ChannelKind::Text, true);
        let bot = channel(ChannelKind::Bot, true);
        let scheduler = TokioScheduler::with_grace_secs(60);
        let svc = service(manager(&[&mail, &text, &bot]).await, Arc::new(MemoryStore::new()), &scheduler);

        let accepted = svc.accept_notification(request(50)).await.unwrap();
        assert_eq!(accepted.status, NotificationStatus::Scheduled);
        assert_eq!(scheduler.pending_jobs(), vec![accepted.id.clone()]);

        let done = wait_for_status(&svc, &accepted.id).await;
        assert_eq!(done.status, NotificationStatus::Sent);
        assert_eq!(done.delivered_via, Some(ChannelKind::Text));
        assert!(done.completed_at.is_some());
        assert!(bot.seen.lock().unwrap().is_empty());

        // Normalized phone digits reach the winning channel.
        let sent = text.seen.lock().unwrap();
        assert_eq!(sent[0].recipient, "89991234567");
        assert_eq!(sent[0].body, "Dentist at 10");
    }

    #[tokio::test]
    async fn test_all_channels_failing_marks_error() {
        let mail = channel(ChannelKind::Mail, false);
        let bot = channel(ChannelKind::Bot, false);
        let scheduler = TokioScheduler::with_grace_secs(60);
        let svc = service(manager(&[&mail, &bot]).await, Arc::new(MemoryStore::new()), &scheduler);

        let accepted = svc.accept_notification(request(60_000)).await.unwrap();
        let done = svc.deliver_now(&accepted.id).await.unwrap();

        assert_eq!(done.status, NotificationStatus::Error);
        assert_eq!(done.error.as_deref(), Some("bot down"));
        assert_eq!(done.delivered_via, None);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_past_fire_time_never_reaches_bridge() {
        let text = channel(ChannelKind::Text, true);
        let store = Arc::new(MemoryStore::new());
        let scheduler = TokioScheduler::with_grace_secs(60);
        let svc = service(manager(&[&text]).await, store.clone(), &scheduler);

        let err = svc.accept_notification(request(-1_000)).await.unwrap_err();
        assert!(matches!(err, NotiflowError::Validation(_)));
        assert!(scheduler.pending_jobs().is_empty());
        assert!(svc.list_notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_now_is_single_shot() {
        let text = channel(ChannelKind::Text, true);
        let scheduler = TokioScheduler::with_grace_secs(60);
        let svc = service(manager(&[&text]).await, Arc::new(MemoryStore::new()), &scheduler);

        let accepted = svc.accept_notification(request(60_000)).await.unwrap();
        svc.deliver_now(&accepted.id).await.unwrap();
        let second = svc.deliver_now(&accepted.id).await.unwrap();

        assert_eq!(second.status, NotificationStatus::Sent);
        assert_eq!(text.seen.lock().unwrap().len(), 1);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let text = channel(ChannelKind::Text, true);
        let scheduler = TokioScheduler::with_grace_secs(60);
        let svc = service(manager(&[&text]).await, Arc::new(MemoryStore::new()), &scheduler);

        assert!(matches!(
            svc.deliver_now("nope").await.unwrap_err(),
            NotiflowError::NotFound(_)
        ));
        assert!(matches!(svc.get("nope").await.unwrap_err(), NotiflowError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_reschedules_pending_records() {
        let text = channel(ChannelKind::Text, true);
        let store = Arc::new(MemoryStore::new());

        let pending = Notification::new(
            Destinations {
                phone: Some("79991234567".into()),
                ..Default::default()
            },
            "Reminder",
            Utc::now() + chrono::Duration::milliseconds(30),
        );
        let mut finished = pending.clone();
        finished.id = "finished".into();
        finished.complete(&DeliveryResult::success(ChannelKind::Text, "sent"));
        store.insert(pending.clone()).await.unwrap();
        store.insert(finished).await.unwrap();

        let scheduler = TokioScheduler::with_grace_secs(60);
        let svc = service(manager(&[&text]).await, store, &scheduler);

        assert_eq!(svc.restore().await.unwrap(), 1);
        assert_eq!(scheduler.pending_jobs(), vec![pending.id.clone()]);

        let done = wait_for_status(&svc, &pending.id).await;
        assert_eq!(done.status, NotificationStatus::Sent);
        assert_eq!(text.seen.lock().unwrap().len(), 1);
    }
}
