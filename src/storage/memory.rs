//! In-memory storage backend
//!
//! Thread-safe via `RwLock`. Walk order is byte-lexicographic on the full path.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{StorageBackend, StorageError, WalkVisitor, normalize_prefix};

#[derive(Debug, Default)]
pub struct MemoryStorageBackend {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend from `(path, content)` pairs
    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        let backend = Self::new();
        for (path, content) in files {
            backend.insert(path, content);
        }
        backend
    }

    /// Insert or replace a file
    pub fn insert(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(path.into(), content.into());
    }

    /// Insert a file of `size` bytes with filler content
    pub fn insert_sized(&self, path: impl Into<String>, size: usize) {
        self.insert(path, vec![b'x'; size]);
    }

    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn walk_dir(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
        visit: &mut WalkVisitor<'_>,
    ) -> Result<(), StorageError> {
        let prefix = normalize_prefix(prefix);
        let entries: Vec<(String, u64)> = {
            let files = self.files.read().map_err(|_| {
                StorageError::BackendError("memory storage lock poisoned".to_string())
            })?;
            files
                .iter()
                .filter(|(path, _)| {
                    prefix.is_empty()
                        || path
                            .strip_prefix(prefix)
                            .is_some_and(|rest| rest.starts_with('/'))
                })
                .map(|(path, content)| (path.clone(), content.len() as u64))
                .collect()
        };

        for (path, size) in entries {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            if visit(&path, size).is_break() {
                break;
            }
        }
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let files = self
            .files
            .read()
            .map_err(|_| StorageError::BackendError("memory storage lock poisoned".to_string()))?;
        Ok(files.contains_key(path))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let files = self
            .files
            .read()
            .map_err(|_| StorageError::BackendError("memory storage lock poisoned".to_string()))?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}
