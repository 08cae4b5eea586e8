//! Filesystem seam
//!
//! The store and the cache touch the disk only through [`Storage`], so
//! tests can swap in backends that fail or count calls.

use std::io;
use std::path::Path;
use std::time::SystemTime;

/// The four file primitives the engine needs. Every call is a discrete
/// open/use/close; implementations hold no per-path handles.
pub trait Storage: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Last-modified time of the file at `path`.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the whole content of `path` with `bytes`.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// `std::fs` backed storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStorage;

impl Storage for DiskStorage {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        std::fs::write(path, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disk_storage_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        let disk = DiskStorage;

        assert!(!disk.exists(&path));
        assert!(disk.modified(&path).is_err());

        disk.write(&path, b"{\"a\":1}").unwrap();
        assert!(disk.exists(&path));
        assert!(disk.modified(&path).is_ok());

        // Writes replace, never append
        disk.write(&path, b"{}").unwrap();
        assert_eq!(disk.read(&path).unwrap(), b"{}");
    }

    #[test]
    fn test_read_missing_file_errors() {
        let dir = tempdir().unwrap();
        assert!(DiskStorage.read(&dir.path().join("nope.json")).is_err());
    }
}
