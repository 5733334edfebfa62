//! Reference-counted connection shared by concurrent deliveries.
//!
//! The first acquire establishes the handle while holding the lock so two
//! callers can never open two connections. Later acquires only bump the
//! count. The release that brings the count back to zero takes the handle
//! out and tears it down after the lock is dropped.

use std::future::Future;
use std::sync::Arc;

use notiflow_core::error::{NotiflowError, Result};
use notiflow_core::types::ChannelKind;
use tokio::sync::Mutex;

struct ConnectionState<H> {
    handle: Option<Arc<H>>,
    refs: usize,
}

/// Snapshot of a connection's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub refs: usize,
    pub connected: bool,
}

/// A lazily established, reference-counted connection handle.
pub struct SharedConnection<H> {
    kind: ChannelKind,
    state: Mutex<ConnectionState<H>>,
}

impl<H> SharedConnection<H>
where
    H: Send + Sync,
{
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            state: Mutex::new(ConnectionState {
                handle: None,
                refs: 0,
            }),
        }
    }

    /// Take a reference, running `establish` only on the 0 → 1 transition.
    /// On failure the count is left unchanged.
    pub async fn acquire<F, Fut>(&self, establish: F) -> Result<Arc<H>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H>>,
    {
        let mut state = self.state.lock().await;
        if state.refs == 0 {
            let handle = establish().await?;
            state.handle = Some(Arc::new(handle));
            tracing::debug!(channel = %self.kind, "Connection established");
        }
        let handle = state.handle.clone().ok_or_else(|| {
            NotiflowError::Connection(format!("{} connection handle missing", self.kind))
        })?;
        state.refs += 1;
        Ok(handle)
    }

    /// Drop a reference; the last one runs `teardown`. Teardown errors are logged.
    pub async fn release<F, Fut>(&self, teardown: F)
    where
        F: FnOnce(Arc<H>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let last = {
            let mut state = self.state.lock().await;
            if state.refs == 0 {
                tracing::warn!(channel = %self.kind, "Release called without a held connection");
                return;
            }
            state.refs -= 1;
            if state.refs == 0 {
                state.handle.take()
            } else {
                None
            }
        };

        if let Some(handle) = last {
            match teardown(handle).await {
                Ok(()) => tracing::debug!(channel = %self.kind, "Connection closed"),
                Err(e) => tracing::warn!(channel = %self.kind, error = %e, "Connection teardown failed"),
            }
        }
    }

    /// Currently held handle, if any.
    pub async fn current(&self) -> Option<Arc<H>> {
        self.state.lock().await.handle.clone()
    }

    pub async fn stats(&self) -> ConnectionStats {
        let state = self.state.lock().await;
        ConnectionStats {
            refs: state.refs,
            connected: state.handle.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Handle;

    async fn establish_counted(counter: &AtomicUsize) -> Result<Handle> {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Handle)
    }

    #[tokio::test]
    async fn test_concurrent_acquire_establishes_once() {
        let conn = Arc::new(SharedConnection::<Handle>::new(ChannelKind::Mail));
        let established = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let conn = conn.clone();
                let established = established.clone();
                tokio::spawn(async move {
                    conn.acquire(|| establish_counted(&established)).await.map(|_| ())
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        assert_eq!(established.load(Ordering::SeqCst), 1);
        assert_eq!(
            conn.stats().await,
            ConnectionStats {
                refs: 8,
                connected: true
            }
        );
    }

    #[tokio::test]
    async fn test_balanced_acquire_release_tears_down_once() {
        let conn = Arc::new(SharedConnection::<Handle>::new(ChannelKind::Text));
        let established = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let conn = conn.clone();
                let established = established.clone();
                let closed = closed.clone();
                tokio::spawn(async move {
                    conn.acquire(|| establish_counted(&established)).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(5 * (i % 3))).await;
                    conn.release(|_| async move {
                        closed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await;
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }

        let stats = conn.stats().await;
        assert_eq!(stats.refs, 0);
        assert!(!stats.connected);
        assert!(conn.current().await.is_none());
        // Every establish is matched by exactly one teardown.
        assert_eq!(
            established.load(Ordering::SeqCst),
            closed.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_failed_establish_leaves_count_untouched() {
        let conn = SharedConnection::<Handle>::new(ChannelKind::Bot);
        let err = conn
            .acquire(|| async { Err(NotiflowError::Connection("refused".into())) })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, NotiflowError::Connection(_)));
        assert_eq!(
            conn.stats().await,
            ConnectionStats {
                refs: 0,
                connected: false
            }
        );

        // Next acquire retries establishment from scratch.
        conn.acquire(|| async { Ok(Handle) }).await.unwrap();
        assert_eq!(conn.stats().await.refs, 1);
    }

    #[tokio::test]
    async fn test_reacquire_after_teardown_reestablishes() {
        let conn = SharedConnection::<Handle>::new(ChannelKind::Mail);
        let established = AtomicUsize::new(0);

        conn.acquire(|| establish_counted(&established)).await.unwrap();
        conn.release(|_| async { Ok(()) }).await;
        conn.acquire(|| establish_counted(&established)).await.unwrap();

        assert_eq!(established.load(Ordering::SeqCst), 2);
        assert!(conn.stats().await.connected);
    }

    #[tokio::test]
    async fn test_teardown_error_is_swallowed() {
        let conn = SharedConnection::<Handle>::new(ChannelKind::Mail);
        conn.acquire(|| async { Ok(Handle) }).await.unwrap();
        conn.release(|_| async { Err(NotiflowError::Connection("quit failed".into())) })
            .await;
        assert!(!conn.stats().await.connected);
    }

    #[tokio::test]
    async fn test_release_without_acquire_is_noop() {
        let conn = SharedConnection::<Handle>::new(ChannelKind::Text);
        conn.release(|_| async { Ok(()) }).await;
        assert_eq!(conn.stats().await.refs, 0);
    }
}
