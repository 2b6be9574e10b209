//! Dump Catalog - metadata discovery for bulk SQL dump loading
//!
//! Provides:
//! - Storage backends to walk and read a dump source
//! - File classification, table filters and table routing rules
//! - `DumpLoader`, which builds a deterministic `Catalog` of databases,
//!   tables, views and data files for an import scheduler
//! - TOML configuration with environment overrides

pub mod config;
pub mod error;
pub mod loader;
pub mod source;
pub mod storage;

pub use config::LoaderConfig;
pub use error::{ErrorKind, LoadFailure, LoaderError, LoaderResult};
pub use loader::{Catalog, DatabaseMeta, DumpLoader, DuplicatePolicy, TableMeta, ViewMeta};
pub use source::{
    CharacterSet, Classifier, Compression, FileInfo, FileRouter, NameRouter, PatternFilter,
    ReplicationRulesFilter, RouteTable, SourceFileMeta, SourceType, TableFilter, TableName,
};
#[cfg(feature = "native-fs")]
pub use storage::FileSystemStorageBackend;
pub use storage::{MemoryStorageBackend, StorageBackend, StorageError};
