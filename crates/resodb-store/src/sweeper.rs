//! Background TTL eviction
//!
//! A tokio task that calls [`DocumentCache::sweep`] on a fixed period.
//! It goes through the same mutex as foreground reads and writes.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::cache::DocumentCache;

/// Handle to a running sweeper. Dropping it aborts the task; call
/// [`CacheSweeper::shutdown`] to stop it and wait for it to finish.
pub struct CacheSweeper {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Start sweeping `cache` every `sweep_interval`. Must be called from
    /// inside a tokio runtime.
    pub fn spawn(cache: Arc<DocumentCache>) -> Self {
        let period = cache.config().sweep_interval();
        let (tx, mut rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "evicted expired cache entries");
                        }
                    }
                    _ = &mut rx => break,
                }
            }
            debug!("cache sweeper stopped");
        });

        Self {
            shutdown: Some(tx),
            task: Some(task),
        }
    }

    /// Stop the sweeper and wait for the task to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::config::CacheConfig;
    use crate::storage::DiskStorage;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<DocumentCache>, Arc<ManualClock>, PathBuf) {
        let path = dir.path().join("db.json");
        std::fs::write(&path, b"{}").unwrap();
        let mtime = DateTime::<Utc>::from(std::fs::metadata(&path).unwrap().modified().unwrap());

        let clock = Arc::new(ManualClock::new(mtime + chrono::Duration::seconds(1)));
        let config = CacheConfig {
            ttl_secs: 10,
            sweep_interval_secs: 2,
            ..Default::default()
        };
        let cache = Arc::new(DocumentCache::with_clock(config, clock.clone()));

        let doc = json!({"cached": true}).as_object().cloned().unwrap();
        assert!(cache.admit(&DiskStorage, &path, &doc));
        (cache, clock, path)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_after_ttl() {
        let dir = TempDir::new().unwrap();
        let (cache, clock, path) = setup(&dir);

        let sweeper = CacheSweeper::spawn(cache.clone());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(cache.contains(&path), "entry is younger than the TTL");

        clock.advance(Duration::from_secs(11));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!cache.contains(&path));

        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_sweeper_leaves_cache_alone() {
        let dir = TempDir::new().unwrap();
        let (cache, clock, path) = setup(&dir);

        CacheSweeper::spawn(cache.clone()).shutdown().await;

        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(cache.contains(&path));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_aborts_sweeper() {
        let dir = TempDir::new().unwrap();
        let (cache, clock, path) = setup(&dir);

        drop(CacheSweeper::spawn(cache.clone()));

        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(cache.contains(&path));
        // The aborted task released its clone
        assert_eq!(Arc::strong_count(&cache), 1);
    }
}
