//! Error types for catalog loading
//!
//! `LoaderError` covers every way a load can fail. Each variant carries the
//! file, schema or table that triggered it so the rendered message is enough
//! to locate the problem without a debugger.

use std::fmt;

use crate::loader::Catalog;

/// Result alias used throughout the loader.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Error raised by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Broad classification of a [`LoaderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Classification,
    Routing,
    TooManyFiles,
    InvalidSchemaFile,
    MissingSchema,
    Storage,
    Cancelled,
    /// Bookkeeping contradiction inside the loader. Not caused by user input.
    Internal,
}

/// Error during catalog loading
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("Configuration conflict: {0}")]
    ConfigConflict(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("apply file routing on file '{path}' failed: {message}")]
    FileRoute { path: String, message: String },

    #[error("table route failed for `{schema}`.`{table}`: {message}")]
    TableRoute {
        schema: String,
        table: String,
        message: String,
    },

    #[error(
        "internal error: reference count of database `{schema}` dropped to {count} while routing; this is a bug, please report it"
    )]
    RouteInvariant { schema: String, count: i64 },

    #[error("too many source files, the scan limit is {limit}")]
    TooManySourceFiles { limit: usize },

    #[error("invalid database schema file, duplicated item - {path}")]
    DuplicateDatabaseSchema { path: String },

    #[error("invalid table schema file, duplicated item - {path}")]
    DuplicateTableSchema { path: String },

    #[error("invalid view schema file, miss host table schema for view '{view}' ({path})")]
    OrphanView {
        schema: String,
        view: String,
        path: String,
    },

    #[error("schema file is missing for the table '{schema}.{table}'")]
    MissingTableSchema { schema: String, table: String },

    #[error(
        "the provided schema file ({path}) for '{}' doesn't exist",
        qualified_name(.schema, .name)
    )]
    SchemaFileNotFound {
        path: String,
        schema: String,
        name: String,
    },

    #[error("schema file '{path}' uses unsupported compression '{compression}'")]
    UnsupportedCompression { path: String, compression: String },

    #[error("failed to decode '{path}' as {charset}: {message}")]
    Decode {
        path: String,
        charset: String,
        message: String,
    },

    #[error("failed to decompress '{path}' ({compression}): {message}")]
    Decompress {
        path: String,
        compression: String,
        message: String,
    },

    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },

    #[error("catalog load cancelled")]
    Cancelled,
}

/// `schema.name`, or just `schema` for database-level entries.
fn qualified_name(schema: &str, name: &str) -> String {
    if name.is_empty() {
        schema.to_string()
    } else {
        format!("{}.{}", schema, name)
    }
}

impl LoaderError {
    /// Wraps a storage failure with the path or operation it concerns.
    pub fn storage(context: impl Into<String>, source: StorageError) -> Self {
        match source {
            StorageError::Cancelled => LoaderError::Cancelled,
            source => LoaderError::Storage {
                context: context.into(),
                source,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LoaderError::ConfigConflict(_) | LoaderError::InvalidConfig(_) => ErrorKind::Config,
            LoaderError::FileRoute { .. } => ErrorKind::Classification,
            LoaderError::TableRoute { .. } => ErrorKind::Routing,
            LoaderError::RouteInvariant { .. } => ErrorKind::Internal,
            LoaderError::TooManySourceFiles { .. } => ErrorKind::TooManyFiles,
            LoaderError::DuplicateDatabaseSchema { .. }
            | LoaderError::DuplicateTableSchema { .. }
            | LoaderError::OrphanView { .. } => ErrorKind::InvalidSchemaFile,
            LoaderError::MissingTableSchema { .. }
            | LoaderError::SchemaFileNotFound { .. }
            | LoaderError::UnsupportedCompression { .. }
            | LoaderError::Decode { .. }
            | LoaderError::Decompress { .. } => ErrorKind::MissingSchema,
            LoaderError::Storage { .. } => ErrorKind::Storage,
            LoaderError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True when the error signals a defect in the loader rather than bad input.
    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

/// Failed load.
///
/// `partial` is only populated for [`LoaderError::TooManySourceFiles`]: the
/// files discovered before the scan limit was hit are still routed, assembled
/// and sorted so the caller can report on them.
pub struct LoadFailure<B> {
    pub error: LoaderError,
    pub partial: Option<Catalog<B>>,
}

impl<B> LoadFailure<B> {
    pub fn fatal(error: LoaderError) -> Self {
        Self {
            error,
            partial: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl<B> From<LoaderError> for LoadFailure<B> {
    fn from(error: LoaderError) -> Self {
        Self::fatal(error)
    }
}

impl<B> fmt::Debug for LoadFailure<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFailure")
            .field("error", &self.error)
            .field("partial", &self.partial)
            .finish()
    }
}

impl<B> fmt::Display for LoadFailure<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<B> std::error::Error for LoadFailure<B> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
