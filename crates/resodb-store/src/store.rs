//! Document store - one JSON object per file
//!
//! `DocumentStore` validates, serializes, optionally encrypts and persists
//! a document for a single path, and mirrors it into the shared
//! [`DocumentCache`] when caching is on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::DocumentCache;
use crate::error::{ErrorKind, StoreError};
use crate::storage::{DiskStorage, Storage};
use crate::Document;

/// How `write` persists the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Block until the bytes are on disk and surface any failure
    #[default]
    Sync,
    /// Hand the bytes to a background thread and return immediately.
    /// Failures are logged but never reach the caller.
    FireAndForget,
}

/// Options for [`DocumentStore::open`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    password: Option<SecretString>,
    caching: bool,
    ensure: bool,
    default_document: Value,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            password: None,
            caching: true,
            ensure: true,
            default_document: Value::Object(Document::new()),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encrypt the file at rest with a key derived from `password`.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::new(password.into()));
        self
    }

    pub fn caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Create the file from the default document on open if it is missing.
    pub fn ensure(mut self, ensure: bool) -> Self {
        self.ensure = ensure;
        self
    }

    pub fn default_document(mut self, document: Value) -> Self {
        self.default_document = document;
        self
    }
}

/// Handle bound to one store file.
pub struct DocumentStore {
    path: PathBuf,
    password: Option<SecretString>,
    caching: bool,
    default_document: Value,
    /// This handle's own copy of the last document it read or wrote
    last_loaded: Option<Document>,
    cache: Arc<DocumentCache>,
    storage: Arc<dyn Storage>,
}

impl DocumentStore {
    /// Open the store at `path`, creating it from the default document if
    /// `ensure` is set and the file is missing.
    pub fn open(
        path: impl Into<PathBuf>,
        options: StoreOptions,
        cache: Arc<DocumentCache>,
    ) -> Result<Self, StoreError> {
        Self::open_with_storage(path, options, cache, Arc::new(DiskStorage))
    }

    pub fn open_with_storage(
        path: impl Into<PathBuf>,
        options: StoreOptions,
        cache: Arc<DocumentCache>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, StoreError> {
        let StoreOptions {
            password,
            caching,
            ensure,
            default_document,
        } = options;

        let mut store = Self {
            path: path.into(),
            password,
            caching,
            default_document,
            last_loaded: None,
            cache,
            storage,
        };

        if ensure {
            store.ensure()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.password.is_some()
    }

    pub fn caching(&self) -> bool {
        self.caching
    }

    /// The last document this handle read or wrote.
    pub fn last_loaded(&self) -> Option<&Document> {
        self.last_loaded.as_ref()
    }

    /// Create the file from the default document if it does not exist yet.
    pub fn ensure(&mut self) -> Result<(), StoreError> {
        if self.storage.exists(&self.path) {
            return Ok(());
        }
        debug!(path = %self.path.display(), "creating store from default document");
        let default_document = self.default_document.clone();
        self.create(&default_document, true)
    }

    /// Write `document` as the initial content of the store.
    ///
    /// With `overwrite` false an existing file is left untouched and
    /// `AlreadyExists` is returned.
    pub fn create(&mut self, document: &Value, overwrite: bool) -> Result<(), StoreError> {
        let document = validate(document)?;
        let serialized = serialize(document)?;

        if !overwrite && self.storage.exists(&self.path) {
            return Err(StoreError::new(ErrorKind::AlreadyExists));
        }

        let bytes = self.seal(serialized)?;
        self.storage
            .write(&self.path, &bytes)
            .map_err(|e| StoreError::with_cause(ErrorKind::Write, e))?;

        if self.caching {
            self.last_loaded = Some(document.clone());
            self.cache.admit(&*self.storage, &self.path, document);
        }
        Ok(())
    }

    /// Read the current document.
    ///
    /// With caching on, a cache entry newer than the file is returned
    /// without touching the disk.
    pub fn read(&mut self) -> Result<Document, StoreError> {
        if self.caching {
            if let Some(cached) = self.cache.lookup(&*self.storage, &self.path) {
                return Ok(cached);
            }
        }

        let raw = self
            .storage
            .read(&self.path)
            .map_err(|e| StoreError::with_cause(ErrorKind::Read, e))?;
        let document = self.open_sealed(raw)?;

        if self.caching {
            self.cache.admit(&*self.storage, &self.path, &document);
        }
        self.last_loaded = Some(document.clone());
        Ok(document)
    }

    /// Replace the stored document.
    ///
    /// In [`WriteMode::FireAndForget`] the returned `Ok` only means the
    /// document was valid and encrypted; the disk write itself may still
    /// fail, and that failure is only visible in the logs.
    pub fn write(&mut self, document: &Value, mode: WriteMode) -> Result<(), StoreError> {
        let document = validate(document)?;
        let serialized = serialize(document)?;
        let bytes = self.seal(serialized)?;

        match mode {
            WriteMode::Sync => {
                self.storage
                    .write(&self.path, &bytes)
                    .map_err(|e| StoreError::with_cause(ErrorKind::Write, e))?;
                // Stamped after the write so the entry is newer than the mtime
                if self.caching {
                    self.cache.admit(&*self.storage, &self.path, document);
                }
            }
            WriteMode::FireAndForget => {
                // Recorded here, in call order, and stamped before the bytes
                // land; the background thread only touches the disk.
                if self.caching {
                    self.cache.admit(&*self.storage, &self.path, document);
                }

                let path = self.path.clone();
                let storage = Arc::clone(&self.storage);
                std::thread::spawn(move || {
                    if let Err(e) = storage.write(&path, &bytes) {
                        warn!(path = %path.display(), error = %e, "background store write failed");
                    }
                });
            }
        }

        self.last_loaded = Some(document.clone());
        Ok(())
    }

    /// Serialized JSON, encrypted when a password is set.
    fn seal(&self, serialized: String) -> Result<Vec<u8>, StoreError> {
        match &self.password {
            Some(password) => resodb_crypto::encrypt(serialized.as_bytes(), password.expose_secret())
                .map(String::into_bytes)
                .map_err(|e| StoreError::with_cause(ErrorKind::Encrypt, e)),
            None => Ok(serialized.into_bytes()),
        }
    }

    /// Inverse of `seal`: decrypt if needed, then parse.
    fn open_sealed(&self, raw: Vec<u8>) -> Result<Document, StoreError> {
        match &self.password {
            Some(password) => {
                let blob = String::from_utf8(raw)
                    .map_err(|e| StoreError::with_cause(ErrorKind::Decrypt, e))?;
                let plaintext = resodb_crypto::decrypt(&blob, password.expose_secret())
                    .map_err(|e| StoreError::with_cause(ErrorKind::Decrypt, e))?;
                parse(plaintext.as_bytes())
            }
            None => parse(&raw),
        }
    }
}

/// Accept only plain JSON objects.
fn validate(value: &Value) -> Result<&Document, StoreError> {
    value
        .as_object()
        .ok_or_else(|| StoreError::new(ErrorKind::InvalidDocument))
}

fn serialize(document: &Document) -> Result<String, StoreError> {
    serde_json::to_string(document).map_err(|e| StoreError::with_cause(ErrorKind::Serialize, e))
}

fn parse(bytes: &[u8]) -> Result<Document, StoreError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(StoreError::with_cause(
            ErrorKind::Parse,
            "stored JSON is not an object",
        )),
        Err(e) => Err(StoreError::with_cause(ErrorKind::Parse, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn shared_cache() -> Arc<DocumentCache> {
        Arc::new(DocumentCache::new(CacheConfig::default()))
    }

    #[test]
    fn test_open_ensures_default_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        let options = StoreOptions::new().default_document(json!({"users": []}));
        let mut store = DocumentStore::open(&path, options, shared_cache()).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"users":[]}"#);
        assert_eq!(Value::Object(store.read().unwrap()), json!({"users": []}));
    }

    #[test]
    fn test_open_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, r#"{"kept":true}"#).unwrap();

        let options = StoreOptions::new().default_document(json!({"fresh": true}));
        let mut store = DocumentStore::open(&path, options, shared_cache()).unwrap();

        assert_eq!(Value::Object(store.read().unwrap()), json!({"kept": true}));
    }

    #[test]
    fn test_open_without_ensure_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        let mut store =
            DocumentStore::open(&path, StoreOptions::new().ensure(false), shared_cache()).unwrap();

        assert!(!path.exists());
        assert_eq!(store.read().unwrap_err().code(), 195);
    }

    #[test]
    fn test_open_fails_with_invalid_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        let options = StoreOptions::new().default_document(json!([1, 2, 3]));
        let err = DocumentStore::open(&path, options, shared_cache()).err().unwrap();

        assert_eq!(err.kind(), ErrorKind::InvalidDocument);
        assert!(!path.exists());
    }

    #[test]
    fn test_open_fails_when_directory_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join("db.json");

        let err = DocumentStore::open(&path, StoreOptions::new(), shared_cache())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Write);
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_create_overwrites_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let mut store = DocumentStore::open(&path, StoreOptions::new(), shared_cache()).unwrap();

        store.create(&json!({"v": 2}), true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"v":2}"#);
    }

    #[test]
    fn test_create_records_snapshot_only_when_caching() {
        let dir = TempDir::new().unwrap();

        let mut cached =
            DocumentStore::open(dir.path().join("a.json"), StoreOptions::new(), shared_cache())
                .unwrap();
        cached.create(&json!({"a": 1}), true).unwrap();
        assert_eq!(cached.last_loaded().map(|d| d.len()), Some(1));

        let mut uncached = DocumentStore::open(
            dir.path().join("b.json"),
            StoreOptions::new().caching(false).ensure(false),
            shared_cache(),
        )
        .unwrap();
        uncached.create(&json!({"b": 1}), true).unwrap();
        assert!(uncached.last_loaded().is_none());
    }

    #[test]
    fn test_write_updates_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let mut store = DocumentStore::open(
            &path,
            StoreOptions::new().caching(false),
            shared_cache(),
        )
        .unwrap();

        store.write(&json!({"n": 7}), WriteMode::Sync).unwrap();
        assert_eq!(store.last_loaded(), json!({"n": 7}).as_object());
    }

    #[test]
    fn test_read_of_non_object_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "[1,2,3]").unwrap();

        let mut store = DocumentStore::open(&path, StoreOptions::new(), shared_cache()).unwrap();
        assert_eq!(store.read().unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_read_of_garbage_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut store = DocumentStore::open(&path, StoreOptions::new(), shared_cache()).unwrap();
        let err = store.read().unwrap_err();
        assert_eq!(err.code(), 196);
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_encrypted_store_rejects_plaintext_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, r#"{"plain":true}"#).unwrap();

        let mut store =
            DocumentStore::open(&path, StoreOptions::new().password("pw"), shared_cache())
                .unwrap();
        assert_eq!(store.read().unwrap_err().kind(), ErrorKind::Decrypt);
    }

    #[test]
    fn test_validate() {
        assert!(validate(&json!({})).is_ok());
        assert!(validate(&json!({"nested": {"deep": [1, null]}})).is_ok());
        for bad in [json!(null), json!([]), json!("s"), json!(1), json!(true)] {
            assert_eq!(validate(&bad).unwrap_err().code(), 193);
        }
    }
}
