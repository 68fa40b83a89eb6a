//! Storage capability behind the bundle cache
//!
//! The cache talks to a small key-value capability interface so it can be
//! exercised against an in-memory fake without a real storage engine. Keys
//! are slash-separated segment paths (`cache/<deploy>/<fingerprint>`).
//!
//! Every operation acquires and releases its underlying handle internally;
//! no handle is held across calls, so storage access is never a cross-call
//! bottleneck.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use etcetera::BaseStrategy;
use log::trace;
use thiserror::Error;

/// Errors surfaced by storage implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage root {path} cannot be opened: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("storage operation on {key} failed: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("no platform cache directory available")]
    NoCacheDir,
}

/// Minimal key-value capability consumed by the bundle cache.
pub trait Storage: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, not an error.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    /// Write a value, silently overwriting any previous one.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// List all keys starting with `prefix`, in stable order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Directory-backed persistent store.
///
/// Key segments map to nested directories with the final segment as the file
/// name. Writes go to a temporary sibling first and are renamed into place,
/// so a concurrent reader never observes a partially-written value.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory when missing.
    ///
    /// This is where an unreachable storage location surfaces.
    pub fn open(root: impl Into<PathBuf>) -> Result<FsStore, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Open {
            path: root.clone(),
            source,
        })?;
        Ok(FsStore { root })
    }

    /// Platform-default store root (`<cache dir>/kiln`).
    pub fn default_root() -> Result<PathBuf, StorageError> {
        let strategy = etcetera::choose_base_strategy().map_err(|_| StorageError::NoCacheDir)?;
        Ok(strategy.cache_dir().join("kiln"))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    fn collect_keys(
        &self,
        dir: &Path,
        relative: &str,
        out: &mut Vec<String>,
    ) -> Result<(), StorageError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StorageError::Io {
                    key: relative.to_owned(),
                    source,
                });
            }
        };
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                key: relative.to_owned(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if relative.is_empty() {
                name
            } else {
                format!("{relative}/{name}")
            };
            if entry.path().is_dir() {
                self.collect_keys(&entry.path(), &key, out)?;
            } else {
                out.push(key);
            }
        }
        Ok(())
    }
}

impl Storage for FsStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.key_path(key);
        let io_err = |source| StorageError::Io {
            key: key.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        trace!("stored {key} ({} bytes)", value.len());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        self.collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

/// In-memory store for tests and ephemeral embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned lock only means another test thread panicked mid-write;
        // the map itself is still usable.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
