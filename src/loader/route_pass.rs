//! Name routing over the scanned buckets
//!
//! Every file is renamed through the configured [`NameRouter`]. A database
//! whose files all move elsewhere loses its schema entry; a target database
//! with no schema entry gets one, borrowed from the database the first moved
//! file came from. Reference counts per database name track this.

use std::collections::HashMap;

use tracing::debug;

use super::catalog::database_placeholder;
use super::scan::Buckets;
use crate::error::{LoaderError, LoaderResult};
use crate::source::{FileInfo, NameRouter, SourceFileMeta, TableName};

#[derive(Debug, Clone, Default)]
struct DbRef {
    /// Schema file of the database, once one is known.
    file_meta: Option<SourceFileMeta>,
    count: i64,
}

/// Per-database file counts, local to one routing pass
#[derive(Debug, Default)]
pub(crate) struct DbRefCounts {
    dbs: HashMap<String, DbRef>,
}

impl DbRefCounts {
    /// Count every bucketed file against its database.
    ///
    /// Databases seen only through table, view or data files start without a
    /// schema file.
    fn from_buckets(buckets: &Buckets) -> Self {
        let mut counts = Self::default();
        for info in &buckets.db_schemas {
            let db = counts.dbs.entry(info.table_name.schema.clone()).or_default();
            db.file_meta.get_or_insert_with(|| info.file_meta.clone());
            db.count += 1;
        }
        for info in buckets
            .table_schemas
            .iter()
            .chain(&buckets.view_schemas)
            .chain(&buckets.table_datas)
        {
            counts
                .dbs
                .entry(info.table_name.schema.clone())
                .or_default()
                .count += 1;
        }
        counts
    }

    /// Move one file from `from` to `to`.
    ///
    /// Returns the schema entry to add when `to` had no schema file yet. The
    /// entry borrows the schema file of `from`, or is path-less when `from`
    /// has none either.
    fn transfer(&mut self, from: &str, to: &str) -> Option<FileInfo> {
        let source = self.dbs.entry(from.to_string()).or_default();
        source.count -= 1;
        let source_meta = source.file_meta.clone();

        let target = self.dbs.entry(to.to_string()).or_default();
        let synthesized = if target.file_meta.is_none() {
            let info = match source_meta {
                Some(file_meta) => FileInfo::new(TableName::schema_only(to), file_meta),
                None => database_placeholder(to),
            };
            target.file_meta = Some(info.file_meta.clone());
            // the synthesized schema entry is itself a file of `to`
            target.count += 1;
            Some(info)
        } else {
            None
        };
        target.count += 1;
        synthesized
    }

    #[cfg(test)]
    fn count(&self, schema: &str) -> Option<i64> {
        self.dbs.get(schema).map(|db| db.count)
    }

    /// Drop schema entries whose database was routed away entirely.
    ///
    /// A negative count is a bookkeeping bug and fails the load.
    fn retain_referenced(&self, db_schemas: &mut Vec<FileInfo>) -> LoaderResult<()> {
        if let Some((schema, db)) = self
            .dbs
            .iter()
            .filter(|(_, db)| db.count < 0)
            .min_by(|a, b| a.0.cmp(b.0))
        {
            return Err(LoaderError::RouteInvariant {
                schema: schema.clone(),
                count: db.count,
            });
        }
        db_schemas.retain(|info| {
            self.dbs
                .get(&info.table_name.schema)
                .is_some_and(|db| db.count > 0)
        });
        Ok(())
    }
}

fn route_bucket(
    router: &dyn NameRouter,
    counts: &mut DbRefCounts,
    files: &mut [FileInfo],
    synthesized: &mut Vec<FileInfo>,
) -> LoaderResult<()> {
    for info in files.iter_mut() {
        let (target_schema, target_table) =
            router.route(&info.table_name.schema, &info.table_name.name)?;
        if target_schema != info.table_name.schema {
            debug!(
                "routing {} to {}.{}",
                info.table_name, target_schema, target_table
            );
            if let Some(entry) = counts.transfer(&info.table_name.schema, &target_schema) {
                synthesized.push(entry);
            }
        }
        info.table_name = TableName::new(target_schema, target_table);
    }
    Ok(())
}

/// Rename every bucketed file through `router` and merge database identities.
pub(crate) fn route_buckets(buckets: &mut Buckets, router: &dyn NameRouter) -> LoaderResult<()> {
    let mut counts = DbRefCounts::from_buckets(buckets);

    // Synthesized schema entries are appended after the existing ones and are
    // not routed again.
    let mut synthesized = Vec::new();
    route_bucket(router, &mut counts, &mut buckets.db_schemas, &mut synthesized)?;
    route_bucket(router, &mut counts, &mut buckets.table_schemas, &mut synthesized)?;
    route_bucket(router, &mut counts, &mut buckets.view_schemas, &mut synthesized)?;
    route_bucket(router, &mut counts, &mut buckets.table_datas, &mut synthesized)?;
    buckets.db_schemas.append(&mut synthesized);

    counts.retain_referenced(&mut buckets.db_schemas)
}
