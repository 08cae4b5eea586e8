//! ResoDB Store - single-file JSON document store
//!
//! Each store is one file holding one JSON object, optionally encrypted at
//! rest, optionally mirrored in a shared in-memory cache that a background
//! sweeper trims by age.

pub mod cache;
pub mod config;
pub mod error;
pub mod storage;
pub mod store;
pub mod sweeper;

/// A stored document: always a plain JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub use cache::{Clock, DocumentCache, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{ErrorKind, ErrorRecord, StoreError};
pub use storage::{DiskStorage, Storage};
pub use store::{DocumentStore, StoreOptions, WriteMode};
pub use sweeper::CacheSweeper;
