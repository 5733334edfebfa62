//! Notification stores.
//!
//! `MemoryStore` keeps records for the process lifetime. `JsonFileStore`
//! mirrors them to `notifications.json`, rewritten on every change and
//! loaded at startup, so scheduled records survive a restart.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::types::{DeliveryResult, Notification};
use tokio::sync::RwLock;

/// Storage for notification records, in insertion order.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Add a new record. Ids are unique.
    async fn insert(&self, notification: Notification) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Notification>>;

    async fn list(&self) -> Result<Vec<Notification>>;

    /// Fold a dispatch outcome into the stored record and return it.
    /// A record that is already terminal is returned unchanged.
    async fn complete(&self, id: &str, result: &DeliveryResult) -> Result<Notification>;

    /// Remove a record, returning whether it existed.
    async fn remove(&self, id: &str) -> Result<bool>;
}

fn insert_record(records: &mut Vec<Notification>, notification: Notification) -> Result<()> {
    if records.iter().any(|n| n.id == notification.id) {
        return Err(NotiflowError::Validation(format!(
            "notification {} already exists",
            notification.id
        )));
    }
    records.push(notification);
    Ok(())
}

fn complete_record(
    records: &mut [Notification],
    id: &str,
    result: &DeliveryResult,
) -> Result<(Notification, bool)> {
    let record = records
        .iter_mut()
        .find(|n| n.id == id)
        .ok_or_else(|| NotiflowError::NotFound(format!("notification {id}")))?;
    let changed = record.complete(result);
    Ok((record.clone(), changed))
}

fn remove_record(records: &mut Vec<Notification>, id: &str) -> bool {
    let len = records.len();
    records.retain(|n| n.id != id);
    records.len() < len
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: Notification) -> Result<()> {
        insert_record(&mut *self.records.write().await, notification)
    }

    async fn get(&self, id: &str) -> Result<Option<Notification>> {
        Ok(self.records.read().await.iter().find(|n| n.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Notification>> {
        Ok(self.records.read().await.clone())
    }

    async fn complete(&self, id: &str, result: &DeliveryResult) -> Result<Notification> {
        complete_record(&mut self.records.write().await, id, result).map(|(n, _)| n)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(remove_record(&mut *self.records.write().await, id))
    }
}

const STORE_FILE: &str = "notifications.json";

/// JSON-file store.
pub struct JsonFileStore {
    file: PathBuf,
    records: RwLock<Vec<Notification>>,
}

impl JsonFileStore {
    /// Open (or create) a store in the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = dir.join(STORE_FILE);
        let records = Self::load(&file);
        if !records.is_empty() {
            tracing::info!("📂 Loaded {} notification(s) from {}", records.len(), file.display());
        }
        Ok(Self {
            file,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    fn load(file: &Path) -> Vec<Notification> {
        if !file.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(file) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", file.display());
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", file.display());
                Vec::new()
            }
        }
    }

    async fn save(&self, records: &[Notification]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.file, json).await?;
        tracing::debug!("💾 Saved {} notification(s) to {}", records.len(), self.file.display());
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for JsonFileStore {
    async fn insert(&self, notification: Notification) -> Result<()> {
        let mut records = self.records.write().await;
        insert_record(&mut records, notification)?;
        self.save(&records).await
    }

    async fn get(&self, id: &str) -> Result<Option<Notification>> {
        Ok(self.records.read().await.iter().find(|n| n.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Notification>> {
        Ok(self.records.read().await.clone())
    }

    async fn complete(&self, id: &str, result: &DeliveryResult) -> Result<Notification> {
        let mut records = self.records.write().await;
        let (record, changed) = complete_record(&mut records, id, result)?;
        if changed {
            self.save(&records).await?;
        }
        Ok(record)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.records.write().await;
        let removed = remove_record(&mut records, id);
        if removed {
            self.save(&records).await?;
        }
        Ok(removed)
    }
}
