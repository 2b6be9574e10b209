//! Source file model and the collaborators that interpret file names
//!
//! Provides:
//! - The per-file descriptors produced while scanning (`SourceFileMeta`, `FileInfo`)
//! - `Classifier` / `FileRouter` - maps a path to schema, table and file kind
//! - `TableFilter` - decides which schemas and tables are wanted
//! - `NameRouter` / `RouteTable` - renames (schema, table) pairs
//! - `export_statement` - reads the DDL text out of a schema file

pub mod file_router;
pub mod filter;
pub mod route;
pub mod statement;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoaderResult;

pub use file_router::{FileRouteRule, FileRouter, RouteResult};
pub use filter::{
    BlackWhiteList, DEFAULT_FILTER, PatternFilter, ReplicationRulesFilter, TableFilter, TableRef,
};
pub use route::{NameRouter, RouteRule, RouteTable};
pub use statement::{CharacterSet, escape_identifier, export_statement};

/// Kind of a classified source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// `CREATE DATABASE` statement
    SchemaSchema,
    /// `CREATE TABLE` statement
    TableSchema,
    /// `CREATE VIEW` statement
    ViewSchema,
    Sql,
    Csv,
    Parquet,
}

impl SourceType {
    pub fn is_data(self) -> bool {
        matches!(self, SourceType::Sql | SourceType::Csv | SourceType::Parquet)
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "schema-schema" => Ok(SourceType::SchemaSchema),
            "table-schema" => Ok(SourceType::TableSchema),
            "view-schema" => Ok(SourceType::ViewSchema),
            "sql" => Ok(SourceType::Sql),
            "csv" => Ok(SourceType::Csv),
            "parquet" => Ok(SourceType::Parquet),
            _ => Err(format!("unknown source type '{}'", s)),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::SchemaSchema => write!(f, "database schema"),
            SourceType::TableSchema => write!(f, "table schema"),
            SourceType::ViewSchema => write!(f, "view schema"),
            SourceType::Sql => write!(f, "sql"),
            SourceType::Csv => write!(f, "csv"),
            SourceType::Parquet => write!(f, "parquet"),
        }
    }
}

/// Compression codec of a source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Lzo,
    Snappy,
    Zstd,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" => Ok(Compression::None),
            "gz" | "gzip" => Ok(Compression::Gzip),
            "lzo" => Ok(Compression::Lzo),
            "snappy" => Ok(Compression::Snappy),
            "zst" | "zstd" => Ok(Compression::Zstd),
            _ => Err(format!("invalid compression type '{}'", s)),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Lzo => write!(f, "lzo"),
            Compression::Snappy => write!(f, "snappy"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

/// Qualified (schema, table) name. `name` is empty for database-level entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Database-level name (empty table part)
    pub fn schema_only(schema: impl Into<String>) -> Self {
        Self::new(schema, "")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", escape_identifier(&self.schema))
        } else {
            write!(
                f,
                "{}.{}",
                escape_identifier(&self.schema),
                escape_identifier(&self.name)
            )
        }
    }
}

/// Immutable descriptor of one physical source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileMeta {
    pub path: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub compression: Compression,
    pub sort_key: String,
    pub file_size: u64,
}

impl SourceFileMeta {
    /// Placeholder meta without a backing file, used when a database or table
    /// is only referenced by other files.
    pub fn placeholder(source_type: SourceType) -> Self {
        Self {
            path: String::new(),
            source_type,
            compression: Compression::None,
            sort_key: String::new(),
            file_size: 0,
        }
    }

    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }
}

/// A source file together with the (schema, table) it was classified under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub table_name: TableName,
    pub file_meta: SourceFileMeta,
}

impl FileInfo {
    pub fn new(table_name: TableName, file_meta: SourceFileMeta) -> Self {
        Self {
            table_name,
            file_meta,
        }
    }

    /// Path-less reference used to upsert a container that has no schema file
    pub(crate) fn placeholder(table_name: TableName, source_type: SourceType) -> Self {
        Self::new(table_name, SourceFileMeta::placeholder(source_type))
    }
}

/// Maps a storage path to its classification.
///
/// Returns `Ok(None)` when the path is not a dump file and must be skipped.
pub trait Classifier: Send + Sync {
    fn classify(&self, path: &str) -> LoaderResult<Option<RouteResult>>;
}
