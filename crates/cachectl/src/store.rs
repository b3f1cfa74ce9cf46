//! Keyed blob stores
//!
//! Keys are relative, `/`-separated paths such as
//! `remote_file/http___example_com-<digest>.json`.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A key-value store for opaque byte blobs
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Whether `key` holds a blob
    fn exists(&self, key: &str) -> bool;

    /// Read the blob at `key`
    fn load(&self, key: &str) -> Result<Vec<u8>>;

    /// Write (or overwrite) the blob at `key`
    fn store(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the blob at `key`; removing a missing key is not an error
    fn delete(&self, key: &str) -> Result<()>;
}

/// Blob store backed by a directory tree
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the cache
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root
    ///
    /// Absolute keys and keys containing `..` are rejected.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !valid {
            return Err(Error::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

impl BlobStore for FileCache {
    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_ok_and(|p| p.is_file())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::KeyNotFound(key.to_string()),
            _ => Error::io(&path, e),
        })
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        // Write beside the target and rename so readers never see a torn blob
        let staging = path.with_extension("tmp");
        fs::write(&staging, bytes).map_err(|e| Error::io(&staging, e))?;
        fs::rename(&staging, &path).map_err(|e| Error::io(&path, e))?;

        log::trace!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}

/// Operation counters for [`MemoryStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub loads: usize,
    pub stores: usize,
    pub deletes: usize,
}

/// In-memory blob store that counts the operations made against it
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    stats: Mutex<StoreStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob without counting it as a store
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), bytes.into());
    }

    /// Current contents of `key`, without counting it as a load
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Operations performed so far
    pub fn stats(&self) -> StoreStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, f: impl FnOnce(&mut StoreStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl BlobStore for MemoryStore {
    fn exists(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn load(&self, key: &str) -> Result<Vec<u8>> {
        self.count(|s| s.loads += 1);
        self.get(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.count(|s| s.stores += 1);
        self.insert(key, bytes);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.count(|s| s.deletes += 1);
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
