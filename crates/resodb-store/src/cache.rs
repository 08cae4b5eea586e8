//! Shared document cache
//!
//! One `DocumentCache` is shared (via `Arc`) by every store handle in the
//! process. Entries are keyed by store path and stamped with the time they
//! were recorded. A read only trusts an entry that is strictly newer than
//! the file's mtime; anything else is ignored, not evicted. Shrinking is
//! left to [`DocumentCache::sweep`], driven by [`crate::CacheSweeper`].
//!
//! The cache never touches the filesystem itself: `admit` and `lookup`
//! take the [`Storage`] of the handle asking, so existence and mtime come
//! from the same backend the document lives in.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::CacheConfig;
use crate::storage::Storage;
use crate::Document;

/// Source of "now" for cache timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to simulate TTL expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
        {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct CacheEntry {
    /// When this snapshot was recorded
    last_update: DateTime<Utc>,
    data: Document,
}

/// Process-wide path → snapshot cache.
pub struct DocumentCache {
    config: CacheConfig,
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl DocumentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // A panic while holding the lock leaves the map structurally intact,
    // so a poisoned guard is still safe to use.
    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `document` as the current snapshot for `path`.
    ///
    /// Best effort: returns `false` without recording anything if the file
    /// does not exist or a size ceiling would be crossed. The total is
    /// recomputed over the whole map on every call, so it is a
    /// point-in-time estimate rather than a running count.
    pub fn admit(&self, storage: &dyn Storage, path: &Path, document: &Document) -> bool {
        if !storage.exists(path) {
            debug!(path = %path.display(), "not caching: file does not exist");
            return false;
        }

        let size = serialized_size(document);
        if size > self.config.max_entry_bytes {
            debug!(path = %path.display(), size, "not caching: document over per-entry limit");
            return false;
        }

        let mut entries = self.entries();
        let others: u64 = entries
            .iter()
            .filter(|(cached, _)| cached.as_path() != path)
            .map(|(_, entry)| serialized_size(&entry.data))
            .sum();
        if others.saturating_add(size) > self.config.max_total_bytes {
            debug!(path = %path.display(), size, others, "not caching: cache is full");
            return false;
        }

        entries.insert(
            path.to_path_buf(),
            CacheEntry {
                last_update: self.clock.now(),
                data: document.clone(),
            },
        );
        true
    }

    /// A copy of the cached snapshot for `path`, if it is newer than the file.
    pub fn lookup(&self, storage: &dyn Storage, path: &Path) -> Option<Document> {
        // Stat outside the lock; only the comparison needs it
        let modified = match storage.modified(path) {
            Ok(time) => DateTime::<Utc>::from(time),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cache bypassed: cannot stat file");
                return None;
            }
        };

        let entries = self.entries();
        let entry = entries.get(path)?;
        if entry.last_update > modified {
            debug!(path = %path.display(), "cache hit");
            Some(entry.data.clone())
        } else {
            debug!(path = %path.display(), "cache entry older than file, ignoring");
            None
        }
    }

    /// Drop every entry older than the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.ttl();

        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| {
            // A timestamp in the future converts to Err and is kept
            let expired = (now - entry.last_update)
                .to_std()
                .map(|age| age > ttl)
                .unwrap_or(false);
            !expired
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries().contains_key(path)
    }

    /// When the entry for `path` was recorded.
    pub fn last_update(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.entries().get(path).map(|entry| entry.last_update)
    }
}

impl Default for DocumentCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Counts bytes instead of buffering them.
struct ByteCounter(u64);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Length of the compact JSON encoding of `document`.
pub(crate) fn serialized_size(document: &Document) -> u64 {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, document) {
        Ok(()) => counter.0,
        // A map of JSON values always serializes; treat failure as too big
        Err(_) => u64::MAX,
    }
}
