//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const ENV_MAX_BYTES: &str = "RESODB_CACHE_MAX_BYTES";
pub const ENV_MAX_ENTRY_BYTES: &str = "RESODB_CACHE_MAX_ENTRY_BYTES";
pub const ENV_TTL_SECS: &str = "RESODB_CACHE_TTL_SECS";
pub const ENV_SWEEP_SECS: &str = "RESODB_CACHE_SWEEP_SECS";

/// Bounds and timings for the shared document cache.
///
/// The default per-entry ceiling is larger than the total ceiling, which
/// makes the per-entry check unreachable unless one of them is overridden.
/// Both are kept so they can be tuned independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Ceiling on the serialized size of the whole cache, in bytes
    pub max_total_bytes: u64,
    /// Ceiling on the serialized size of a single document, in bytes
    pub max_entry_bytes: u64,
    /// Entries older than this are dropped by the sweeper
    pub ttl_secs: u64,
    /// How often the sweeper runs
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: 100_000_000,
            max_entry_bytes: 500_000_000,
            ttl_secs: 1000,
            sweep_interval_secs: 2,
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by any `RESODB_CACHE_*` variables that are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CacheConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str, fallback: u64| -> u64 {
            match lookup(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!(%key, value = %raw, "ignoring unparseable cache setting");
                    fallback
                }),
                None => fallback,
            }
        };

        Self {
            max_total_bytes: read(ENV_MAX_BYTES, defaults.max_total_bytes),
            max_entry_bytes: read(ENV_MAX_ENTRY_BYTES, defaults.max_entry_bytes),
            ttl_secs: read(ENV_TTL_SECS, defaults.ttl_secs),
            // A zero period would make tokio's interval panic
            sweep_interval_secs: read(ENV_SWEEP_SECS, defaults.sweep_interval_secs).max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
