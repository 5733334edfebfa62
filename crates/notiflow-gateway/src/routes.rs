//! API route handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use notiflow_channels::ManagerState;
use notiflow_core::types::Notification;
use notiflow_scheduler::NotificationRequest;

use crate::error::ApiError;
use crate::server::AppState;

/// Service info and endpoint listing.
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Notification Service API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "schedule_notification": "POST /schedule-notification",
            "get_notifications": "GET /notifications",
            "get_notification": "GET /notifications/{id}",
            "health": "GET /health",
        },
    }))
}

/// Dispatch manager state and live channels.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let manager = state.service.manager();
    let manager_state = manager.state();
    Json(serde_json::json!({
        "status": if manager_state == ManagerState::Ready { "ok" } else { "degraded" },
        "dispatch": manager_state,
        "channels": manager.registered_kinds(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Accept a notification for delivery at `notification_date`.
pub async fn schedule_notification(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = payload?;
    let notification = state.service.accept_notification(request).await?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "ok",
        "notification_id": notification.id,
        "scheduled_time": notification.fire_at,
    })))
}

/// All notification records, in acceptance order.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let notifications = state.service.list_notifications().await?;
    Ok(Json(serde_json::json!({
        "total": notifications.len(),
        "notifications": notifications,
    })))
}

pub async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    Ok(Json(state.service.get(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use notiflow_channels::{ChannelBuilder, DispatchManager};
    use notiflow_core::error::Result;
    use notiflow_core::traits::Channel;
    use notiflow_core::types::{ChannelKind, DeliveryResult, Envelope, NotificationStatus};
    use notiflow_scheduler::{MemoryStore, NotificationService, TokioScheduler};
    use tower::ServiceExt;

    struct OkChannel;

    #[async_trait]
    impl Channel for OkChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Bot
        }

        async fn acquire(&self) -> Result<()> {
            Ok(())
        }

        async fn release(&self) {}

        async fn test_connectivity(&self) -> bool {
            true
        }

        async fn deliver(&self, _envelope: &Envelope) -> Result<DeliveryResult> {
            Ok(DeliveryResult::success(ChannelKind::Bot, "sent"))
        }
    }

    async fn test_state() -> State<Arc<AppState>> {
        State(Arc::new(app_state().await))
    }

    async fn app_state() -> AppState {
        let build: ChannelBuilder = Box::new(|| {
            let channel: Arc<dyn Channel> = Arc::new(OkChannel);
            Ok(channel)
        });
        let manager = DispatchManager::with_builders(vec![(ChannelKind::Bot, build)]);
        manager.initialize().await.unwrap();
        let service = NotificationService::new(
            Arc::new(manager),
            Arc::new(MemoryStore::new()),
            Arc::new(TokioScheduler::with_grace_secs(60)),
        );
        AppState::new(service)
    }

    fn request(in_secs: i64) -> NotificationRequest {
        serde_json::from_value(serde_json::json!({
            "phone": "+7 999 123 45 67",
            "email": "user@example.com",
            "tg_id": "123456",
            "notification_date": Utc::now() + chrono::Duration::seconds(in_secs),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let json = root().await.0;
        assert_eq!(json["message"], "Notification Service API");
        assert_eq!(json["endpoints"]["schedule_notification"], "POST /schedule-notification");
    }

    #[tokio::test]
    async fn test_health_reports_ready_channels() {
        let json = health_check(test_state().await).await.0;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["dispatch"], "ready");
        assert_eq!(json["channels"], serde_json::json!(["bot"]));
    }

    #[tokio::test]
    async fn test_schedule_then_list_and_get() {
        let state = test_state().await;

        let json = schedule_notification(state.clone(), Ok(Json(request(3600))))
            .await
            .unwrap()
            .0;
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "ok");
        let id = json["notification_id"].as_str().unwrap().to_string();

        let list = list_notifications(state.clone()).await.unwrap().0;
        assert_eq!(list["total"], 1);
        assert_eq!(list["notifications"][0]["id"], id.as_str());
        assert_eq!(list["notifications"][0]["status"], "scheduled");
        assert_eq!(list["notifications"][0]["destinations"]["phone"], "79991234567");

        let record = get_notification(state.clone(), Path(id)).await.unwrap().0;
        assert_eq!(record.status, NotificationStatus::Scheduled);
        assert_eq!(record.message, "Reminder");
    }

    #[tokio::test]
    async fn test_schedule_in_past_is_bad_request() {
        let err = schedule_notification(test_state().await, Ok(Json(request(-10))))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_notification_is_not_found() {
        let err = get_notification(test_state().await, Path("missing".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_body_renders_detail() {
        let router = build_router(app_state().await);
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/schedule-notification")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"tg_id": "1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["detail"].as_str().unwrap().contains("notification_date"));
    }

    #[tokio::test]
    async fn test_router_serves_notification_by_id() {
        let state = app_state().await;
        let accepted = state.service.accept_notification(request(3600)).await.unwrap();
        let router = build_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/notifications/{}", accepted.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
