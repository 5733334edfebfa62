//! # Notiflow Scheduler
//! Deferred delivery of notifications.
//!
//! Accepted notifications are stored, then handed to a [`SchedulingBridge`]
//! which fires [`NotificationService::deliver_now`] at the requested instant.

pub mod bridge;
pub mod request;
pub mod service;
pub mod store;

pub use bridge::{JobCallback, SchedulingBridge, TokioScheduler};
pub use request::NotificationRequest;
pub use service::NotificationService;
pub use store::{JsonFileStore, MemoryStore, NotificationStore};
