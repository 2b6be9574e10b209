//! Storage walk: classify, filter and bucket every source file

use std::ops::ControlFlow;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{LoaderError, LoaderResult};
use crate::source::{Classifier, FileInfo, SourceFileMeta, SourceType, TableFilter, TableName};
use crate::storage::StorageBackend;

/// Classified files, each list in walk order
#[derive(Debug, Default)]
pub(crate) struct Buckets {
    pub db_schemas: Vec<FileInfo>,
    pub table_schemas: Vec<FileInfo>,
    pub view_schemas: Vec<FileInfo>,
    pub table_datas: Vec<FileInfo>,
}

impl Buckets {
    pub fn len(&self) -> usize {
        self.db_schemas.len()
            + self.table_schemas.len()
            + self.view_schemas.len()
            + self.table_datas.len()
    }

    fn push(&mut self, info: FileInfo) {
        match info.file_meta.source_type {
            SourceType::SchemaSchema => self.db_schemas.push(info),
            SourceType::TableSchema => self.table_schemas.push(info),
            SourceType::ViewSchema => self.view_schemas.push(info),
            SourceType::Sql | SourceType::Csv | SourceType::Parquet => self.table_datas.push(info),
        }
    }
}

/// Result of a walk. `overflow` is set when the scan ceiling stopped it early.
pub(crate) struct ScanOutput {
    pub buckets: Buckets,
    pub overflow: Option<LoaderError>,
}

fn should_skip(filter: &dyn TableFilter, name: &TableName) -> bool {
    if name.name.is_empty() {
        !filter.match_schema(&name.schema)
    } else {
        !filter.match_table(&name.schema, &name.name)
    }
}

/// Walk `storage` once and bucket the classified files.
///
/// `max_files` bounds the number of classified, unfiltered files (0 =
/// unbounded). Exceeding it stops the walk but keeps what was collected.
pub(crate) async fn scan<B: StorageBackend + ?Sized>(
    storage: &B,
    classifier: &dyn Classifier,
    filter: &dyn TableFilter,
    max_files: usize,
    cancel: &CancellationToken,
) -> LoaderResult<ScanOutput> {
    let mut buckets = Buckets::default();
    let mut failure: Option<LoaderError> = None;
    let mut overflow = None;

    let walked = {
        let mut visit = |path: &str, size: u64| -> ControlFlow<()> {
            let res = match classifier.classify(path) {
                Ok(Some(res)) => res,
                Ok(None) => {
                    info!("[loader] file is filtered by file router: {}", path);
                    return ControlFlow::Continue(());
                }
                Err(e) => {
                    failure = Some(e);
                    return ControlFlow::Break(());
                }
            };

            if should_skip(filter, &res.table_name) {
                debug!("[filter] ignoring table file: {}", path);
                return ControlFlow::Continue(());
            }

            if max_files > 0 && buckets.len() >= max_files {
                overflow = Some(LoaderError::TooManySourceFiles { limit: max_files });
                return ControlFlow::Break(());
            }

            debug!(
                "file route result: {} -> {} ({})",
                path, res.table_name, res.source_type
            );
            buckets.push(FileInfo::new(
                res.table_name,
                SourceFileMeta {
                    path: path.to_string(),
                    source_type: res.source_type,
                    compression: res.compression,
                    sort_key: res.key,
                    file_size: size,
                },
            ));
            ControlFlow::Continue(())
        };
        storage.walk_dir("", cancel, &mut visit).await
    };

    walked.map_err(|e| LoaderError::storage("list file failed", e))?;
    if let Some(e) = failure {
        return Err(e);
    }
    if cancel.is_cancelled() {
        return Err(LoaderError::Cancelled);
    }

    info!(
        "scanned {} source files: {} database schemas, {} table schemas, {} view schemas, {} data files",
        buckets.len(),
        buckets.db_schemas.len(),
        buckets.table_schemas.len(),
        buckets.view_schemas.len(),
        buckets.table_datas.len()
    );
    Ok(ScanOutput { buckets, overflow })
}
