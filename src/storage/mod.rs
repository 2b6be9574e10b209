//! Storage backends for dump sources
//!
//! The loader only needs three capabilities from a source location: walk every
//! file with its size, check whether a file exists, and read a file. Backends:
//! - `MemoryStorageBackend` - in-memory map, used by tests and embedders
//! - `FileSystemStorageBackend` - local directory (requires `native-fs`)

use std::ops::ControlFlow;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use crate::error::StorageError;

#[cfg(feature = "native-fs")]
pub mod filesystem;
pub mod memory;

#[cfg(feature = "native-fs")]
pub use filesystem::FileSystemStorageBackend;
pub use memory::MemoryStorageBackend;

/// Visitor invoked for each file found by [`StorageBackend::walk_dir`].
///
/// Receives the path relative to the backend root (`/`-separated) and the
/// file size in bytes. Returning `ControlFlow::Break` stops the walk.
pub type WalkVisitor<'a> = dyn FnMut(&str, u64) -> ControlFlow<()> + Send + 'a;

/// Read-only access to a dump source location.
///
/// Implementations must be shareable between concurrent loads; none of the
/// operations may mutate the source.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Visit every regular file under `prefix` (empty = whole store).
    ///
    /// Files must be visited in a repeatable lexicographic order. The walk
    /// returns `StorageError::Cancelled` once `cancel` fires, and returns
    /// `Ok(())` early when the visitor breaks.
    async fn walk_dir(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
        visit: &mut WalkVisitor<'_>,
    ) -> Result<(), StorageError>;

    /// Check if a file exists
    async fn file_exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Read the whole file
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError>;
}

#[async_trait]
impl<T: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<T> {
    async fn walk_dir(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
        visit: &mut WalkVisitor<'_>,
    ) -> Result<(), StorageError> {
        (**self).walk_dir(prefix, cancel, visit).await
    }

    async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        (**self).file_exists(path).await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        (**self).read_file(path).await
    }
}

/// Normalize a walk prefix: no leading `./` or `/`, no trailing `/`.
pub(crate) fn normalize_prefix(prefix: &str) -> &str {
    let prefix = prefix.strip_prefix("./").unwrap_or(prefix);
    prefix.trim_matches('/')
}
