//! File system storage backend
//!
//! Serves a local dump directory. Paths handed to and returned from the
//! backend are relative to the base directory and use `/` separators.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{StorageBackend, StorageError, WalkVisitor, normalize_prefix};

/// Storage backend rooted at a local directory
#[derive(Debug, Clone)]
pub struct FileSystemStorageBackend {
    base_path: PathBuf,
}

enum Pending {
    Dir(PathBuf, String),
    File(String, u64),
}

impl FileSystemStorageBackend {
    /// Create a new file system storage backend
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    /// Read one directory, returning its entries sorted by name.
    async fn sorted_entries(
        &self,
        dir: &Path,
        relative: &str,
    ) -> Result<Vec<Pending>, StorageError> {
        let mut reader = fs::read_dir(dir)
            .await
            .map_err(|e| StorageError::IoError(format!("{}: {}", dir.display(), e)))?;

        let mut names: Vec<(OsString, PathBuf)> = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| StorageError::IoError(format!("{}: {}", dir.display(), e)))?
        {
            names.push((entry.file_name(), entry.path()));
        }
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pending = Vec::with_capacity(names.len());
        for (name, path) in names {
            let name = name.to_string_lossy();
            let child = if relative.is_empty() {
                name.into_owned()
            } else {
                format!("{}/{}", relative, name)
            };
            let metadata = fs::symlink_metadata(&path)
                .await
                .map_err(|e| StorageError::IoError(format!("{}: {}", path.display(), e)))?;
            if metadata.is_dir() {
                pending.push(Pending::Dir(path, child));
            } else if metadata.is_file() {
                pending.push(Pending::File(child, metadata.len()));
            } else if metadata.file_type().is_symlink() {
                // Symlinked files are listed with their target's size. Links to
                // directories are never descended into.
                match fs::metadata(&path).await {
                    Ok(target) if target.is_file() => {
                        pending.push(Pending::File(child, target.len()));
                    }
                    Ok(_) => debug!(path = %path.display(), "skipping directory symlink"),
                    Err(e) => debug!(path = %path.display(), "skipping broken symlink: {}", e),
                }
            }
        }
        Ok(pending)
    }
}

#[async_trait]
impl StorageBackend for FileSystemStorageBackend {
    async fn walk_dir(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
        visit: &mut WalkVisitor<'_>,
    ) -> Result<(), StorageError> {
        let prefix = normalize_prefix(prefix);
        let root = self.resolve(prefix)?;
        if !fs::try_exists(&root)
            .await
            .map_err(|e| StorageError::IoError(format!("{}: {}", root.display(), e)))?
        {
            return Err(StorageError::NotFound(root.display().to_string()));
        }

        // Depth-first, each directory's entries in name order. The stack is
        // filled in reverse so entries pop in ascending order.
        let mut stack = vec![Pending::Dir(root, prefix.to_string())];
        while let Some(next) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            match next {
                Pending::Dir(path, relative) => {
                    debug!(dir = %path.display(), "walking directory");
                    let entries = self.sorted_entries(&path, &relative).await?;
                    stack.extend(entries.into_iter().rev());
                }
                Pending::File(relative, size) => {
                    if visit(&relative, size).is_break() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let full_path = self.resolve(path)?;
        match fs::metadata(&full_path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(format!("{}: {}", full_path.display(), e))),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full_path = self.resolve(path)?;
        fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::IoError(format!("{}: {}", full_path.display(), e))
            }
        })
    }
}
