//! Catalog produced by a load
//!
//! `Catalog` owns an ordered list of `DatabaseMeta`; each database owns its
//! tables and views. The tree has no back-references: tables carry the name of
//! their database, nothing more.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::{LoaderError, LoaderResult};
use crate::source::{
    CharacterSet, FileInfo, SourceFileMeta, SourceType, TableName, escape_identifier,
    export_statement,
};
use crate::storage::StorageBackend;

/// Logical table with its schema file and data chunks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMeta {
    pub db_name: String,
    pub name: String,
    /// Path-less when only data files referenced the table
    pub schema_file: FileInfo,
    pub data_files: Vec<FileInfo>,
    pub total_size: u64,
    pub index_ratio: f64,
    pub is_row_ordered: bool,
    #[serde(skip)]
    pub(crate) charset: CharacterSet,
}

/// Views share the table layout; they never hold data files.
pub type ViewMeta = TableMeta;

impl TableMeta {
    pub(crate) fn new(schema_file: FileInfo, charset: CharacterSet) -> Self {
        Self {
            db_name: schema_file.table_name.schema.clone(),
            name: schema_file.table_name.name.clone(),
            schema_file,
            data_files: Vec::with_capacity(16),
            total_size: 0,
            index_ratio: 0.0,
            is_row_ordered: true,
            charset,
        }
    }

    pub fn table_name(&self) -> TableName {
        TableName::new(self.db_name.clone(), self.name.clone())
    }

    /// DDL text of the table (or view).
    ///
    /// There is no fallback: a table without a schema file, or whose schema
    /// file is gone, is an error. Empty extracted text is returned as is.
    pub async fn get_schema<B: StorageBackend + ?Sized>(
        &self,
        storage: &B,
        cancel: &CancellationToken,
    ) -> LoaderResult<String> {
        if !self.schema_file.file_meta.has_path() {
            return Err(LoaderError::MissingTableSchema {
                schema: self.db_name.clone(),
                table: self.name.clone(),
            });
        }

        let path = &self.schema_file.file_meta.path;
        let exists = storage
            .file_exists(path)
            .await
            .map_err(|e| LoaderError::storage(format!("check schema file '{}'", path), e))?;
        if !exists {
            return Err(LoaderError::SchemaFileNotFound {
                path: path.clone(),
                schema: self.db_name.clone(),
                name: self.name.clone(),
            });
        }

        export_statement(storage, &self.schema_file, self.charset, cancel)
            .await
            .inspect_err(|e| {
                error!(
                    "failed to extract table schema of {} from {}: {}",
                    self.table_name(),
                    path,
                    e
                )
            })
    }
}

/// Logical database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseMeta {
    pub name: String,
    /// Path-less when no `-schema-create` file was found
    pub schema_file: FileInfo,
    pub tables: Vec<TableMeta>,
    pub views: Vec<ViewMeta>,
    #[serde(skip)]
    pub(crate) charset: CharacterSet,
}

impl DatabaseMeta {
    pub(crate) fn new(name: String, schema_file: FileInfo, charset: CharacterSet) -> Self {
        Self {
            name,
            schema_file,
            tables: Vec::new(),
            views: Vec::new(),
            charset,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableMeta> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn view(&self, name: &str) -> Option<&ViewMeta> {
        self.views.iter().find(|v| v.name == name)
    }

    fn default_schema(&self) -> String {
        format!("CREATE DATABASE IF NOT EXISTS {}", escape_identifier(&self.name))
    }

    /// DDL text of the database.
    ///
    /// Falls back to `CREATE DATABASE IF NOT EXISTS` when no schema file was
    /// recorded, when extraction fails, or when the file holds no statement.
    /// A recorded schema file that no longer exists is still an error.
    pub async fn get_schema<B: StorageBackend + ?Sized>(
        &self,
        storage: &B,
        cancel: &CancellationToken,
    ) -> LoaderResult<String> {
        if self.schema_file.file_meta.has_path() {
            let path = &self.schema_file.file_meta.path;
            let exists = storage
                .file_exists(path)
                .await
                .map_err(|e| LoaderError::storage(format!("check schema file '{}'", path), e))?;
            if !exists {
                return Err(LoaderError::SchemaFileNotFound {
                    path: path.clone(),
                    schema: self.name.clone(),
                    name: String::new(),
                });
            }

            match export_statement(storage, &self.schema_file, self.charset, cancel).await {
                Ok(stmt) if !stmt.trim().is_empty() => return Ok(stmt),
                Ok(_) => {}
                Err(LoaderError::Cancelled) => return Err(LoaderError::Cancelled),
                Err(e) => {
                    warn!(
                        "failed to extract database schema from {}, using default statement: {}",
                        path, e
                    );
                }
            }
        }
        Ok(self.default_schema())
    }
}

/// Databases discovered in a dump source, in first-reference order
#[derive(Serialize)]
pub struct Catalog<B> {
    databases: Vec<DatabaseMeta>,
    #[serde(skip)]
    storage: Arc<B>,
    #[serde(skip)]
    charset: CharacterSet,
}

impl<B> Catalog<B> {
    pub(crate) fn new(databases: Vec<DatabaseMeta>, storage: Arc<B>, charset: CharacterSet) -> Self {
        Self {
            databases,
            storage,
            charset,
        }
    }

    pub fn databases(&self) -> &[DatabaseMeta] {
        &self.databases
    }

    pub fn into_databases(self) -> Vec<DatabaseMeta> {
        self.databases
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseMeta> {
        self.databases.iter().find(|db| db.name == name)
    }

    /// Storage the catalog was built from, for reading schema and data files
    pub fn storage(&self) -> &Arc<B> {
        &self.storage
    }

    pub fn charset(&self) -> CharacterSet {
        self.charset
    }

    pub fn table_count(&self) -> usize {
        self.databases.iter().map(|db| db.tables.len()).sum()
    }

    pub fn view_count(&self) -> usize {
        self.databases.iter().map(|db| db.views.len()).sum()
    }

    pub fn data_file_count(&self) -> usize {
        self.databases
            .iter()
            .flat_map(|db| db.tables.iter())
            .map(|t| t.data_files.len())
            .sum()
    }

    /// SHA-256 over every name and file entry, in catalog order.
    ///
    /// Each file contributes its path, source type, compression, sort key and
    /// size. Two catalogs with equal fingerprints have the same structure and
    /// order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut put = |part: &str| {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        };
        fn put_file(put: &mut dyn FnMut(&str), meta: &SourceFileMeta) {
            put(&meta.path);
            put(&meta.source_type.to_string());
            put(&meta.compression.to_string());
            put(&meta.sort_key);
            put(&meta.file_size.to_string());
        }
        for db in &self.databases {
            put("db");
            put(&db.name);
            put_file(&mut put, &db.schema_file.file_meta);
            for (kind, entries) in [("table", &db.tables), ("view", &db.views)] {
                for table in entries {
                    put(kind);
                    put(&table.name);
                    put_file(&mut put, &table.schema_file.file_meta);
                    put(&table.total_size.to_string());
                    for file in &table.data_files {
                        put_file(&mut put, &file.file_meta);
                    }
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

impl<B> fmt::Debug for Catalog<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("databases", &self.databases)
            .field("charset", &self.charset)
            .finish_non_exhaustive()
    }
}

pub(crate) fn database_placeholder(schema: &str) -> FileInfo {
    FileInfo::placeholder(TableName::schema_only(schema), SourceType::SchemaSchema)
}
