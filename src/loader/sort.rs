//! Import ordering of the assembled tree

use super::catalog::DatabaseMeta;

/// Order tables by total data size and data files by sort key.
///
/// Small tables go first so a large table cannot hold the shared index
/// workers while many small ones wait. Both sorts are stable; databases keep
/// their first-reference order.
pub(crate) fn sort_databases(dbs: &mut [DatabaseMeta]) {
    for db in dbs.iter_mut() {
        db.tables.sort_by_key(|table| table.total_size);
        for table in &mut db.tables {
            table
                .data_files
                .sort_by(|a, b| a.file_meta.sort_key.cmp(&b.file_meta.sort_key));
        }
    }
}
