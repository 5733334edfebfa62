//! Scheduling bridge. One-shot jobs fired at an absolute instant.
//!
//! `TokioScheduler` parks one task per job on a tokio timer. A job that wakes
//! within the grace window of its fire time runs; a later one is logged as
//! missed and dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use notiflow_core::error::{NotiflowError, Result};
use tokio::task::JoinHandle;

/// Work run when a job fires.
pub type JobCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Deferred-execution service.
pub trait SchedulingBridge: Send + Sync {
    /// Register a one-shot job. Job ids must be unique among pending jobs.
    fn schedule_at(&self, job_id: &str, fire_at: DateTime<Utc>, callback: JobCallback) -> Result<()>;

    /// Best-effort cancellation. Returns `true` if a pending job was removed.
    fn cancel(&self, job_id: &str) -> bool;

    /// Ids of jobs that have not yet completed, missed or been cancelled.
    fn pending_jobs(&self) -> Vec<String>;
}

struct PendingJob {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct JobTable {
    next_generation: u64,
    jobs: HashMap<String, PendingJob>,
}

impl JobTable {
    /// Drop the entry only if it still belongs to the finishing task.
    fn prune(&mut self, job_id: &str, generation: u64) {
        if self
            .jobs
            .get(job_id)
            .is_some_and(|job| job.generation == generation)
        {
            self.jobs.remove(job_id);
        }
    }
}

/// Tokio-timer scheduling bridge.
#[derive(Clone)]
pub struct TokioScheduler {
    grace: Duration,
    table: Arc<Mutex<JobTable>>,
}

impl TokioScheduler {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            table: Arc::new(Mutex::new(JobTable::default())),
        }
    }

    pub fn with_grace_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    fn table(&self) -> std::sync::MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Abort every pending job.
    pub fn shutdown(&self) {
        let jobs: Vec<_> = self.table().jobs.drain().collect();
        for (job_id, job) in &jobs {
            job.handle.abort();
            tracing::debug!(job_id = %job_id, "Job aborted on shutdown");
        }
        if !jobs.is_empty() {
            tracing::info!("⏹️ Scheduler stopped, {} pending job(s) dropped", jobs.len());
        }
    }
}

impl SchedulingBridge for TokioScheduler {
    fn schedule_at(&self, job_id: &str, fire_at: DateTime<Utc>, callback: JobCallback) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NotiflowError::Scheduler(format!("no async runtime: {e}")))?;

        let mut table = self.table();
        if table.jobs.contains_key(job_id) {
            return Err(NotiflowError::Scheduler(format!(
                "job {job_id} is already scheduled"
            )));
        }
        table.next_generation += 1;
        let generation = table.next_generation;

        let id = job_id.to_string();
        let grace = self.grace;
        let jobs = Arc::clone(&self.table);
        // The task cannot prune before it is inserted: it needs the table lock we hold.
        let handle = runtime.spawn(async move {
            let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            let late = (Utc::now() - fire_at).to_std().unwrap_or(Duration::ZERO);
            if late > grace {
                tracing::warn!(
                    job_id = %id,
                    late_secs = late.as_secs(),
                    "⏰ Job missed its fire time beyond the grace window, skipping"
                );
            } else {
                tracing::debug!(job_id = %id, "Job fired");
                callback().await;
            }

            jobs.lock().unwrap_or_else(|e| e.into_inner()).prune(&id, generation);
        });

        table
            .jobs
            .insert(job_id.to_string(), PendingJob { generation, handle });
        tracing::info!(job_id = %job_id, fire_at = %fire_at, "📅 Job scheduled");
        Ok(())
    }

    fn cancel(&self, job_id: &str) -> bool {
        match self.table().jobs.remove(job_id) {
            Some(job) => {
                job.handle.abort();
                tracing::info!(job_id = %job_id, "Job cancelled");
                true
            }
            None => false,
        }
    }

    fn pending_jobs(&self) -> Vec<String> {
        self.table().jobs.keys().cloned().collect()
    }
}
