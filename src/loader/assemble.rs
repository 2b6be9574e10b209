//! Fold routed buckets into the database / table / view tree

use std::collections::{HashMap, HashSet};

use super::catalog::{DatabaseMeta, TableMeta, ViewMeta, database_placeholder};
use super::scan::Buckets;
use crate::error::{LoaderError, LoaderResult};
use crate::source::{CharacterSet, FileInfo, SourceType, TableName};

/// How duplicate schema files for one database or table are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Each database and table must have at most one schema file
    StrictUniqueness,
    /// Routing may map several schema files onto one name; the first wins
    AllowMergeViaRouting,
}

impl DuplicatePolicy {
    pub fn for_routing(routing_configured: bool) -> Self {
        if routing_configured {
            DuplicatePolicy::AllowMergeViaRouting
        } else {
            DuplicatePolicy::StrictUniqueness
        }
    }

    fn rejects_duplicates(self) -> bool {
        self == DuplicatePolicy::StrictUniqueness
    }
}

/// Lazy-upsert state of one assembly. The index maps are dropped afterwards.
struct Assembler {
    dbs: Vec<DatabaseMeta>,
    db_index: HashMap<String, usize>,
    table_index: HashMap<TableName, usize>,
    charset: CharacterSet,
}

impl Assembler {
    fn new(charset: CharacterSet) -> Self {
        Self {
            dbs: Vec::new(),
            db_index: HashMap::new(),
            table_index: HashMap::new(),
            charset,
        }
    }

    /// Returns the database index and whether it already existed.
    fn insert_db(&mut self, info: FileInfo) -> (usize, bool) {
        if let Some(&index) = self.db_index.get(&info.table_name.schema) {
            return (index, true);
        }
        let index = self.dbs.len();
        let name = info.table_name.schema.clone();
        self.db_index.insert(name.clone(), index);
        self.dbs.push(DatabaseMeta::new(name, info, self.charset));
        (index, false)
    }

    /// Returns the owning database index, the table index and whether the
    /// table already existed.
    fn insert_table(&mut self, info: FileInfo) -> (usize, usize, bool) {
        let (db, _) = self.insert_db(database_placeholder(&info.table_name.schema));
        if let Some(&index) = self.table_index.get(&info.table_name) {
            return (db, index, true);
        }
        let index = self.dbs[db].tables.len();
        self.table_index.insert(info.table_name.clone(), index);
        self.dbs[db].tables.push(TableMeta::new(info, self.charset));
        (db, index, false)
    }

    /// Registers a view. Returns false when its host table is unknown.
    fn insert_view(&mut self, info: FileInfo, known_tables: &HashSet<TableName>) -> bool {
        let (db, _) = self.insert_db(database_placeholder(&info.table_name.schema));
        if !self.table_index.contains_key(&info.table_name)
            && !known_tables.contains(&info.table_name)
        {
            return false;
        }
        let view: ViewMeta = TableMeta::new(info, self.charset);
        self.dbs[db].views.push(view);
        true
    }

    fn append_data(&mut self, info: FileInfo) {
        let reference = FileInfo::placeholder(info.table_name.clone(), SourceType::TableSchema);
        let (db, table, _) = self.insert_table(reference);
        let table = &mut self.dbs[db].tables[table];
        table.total_size += info.file_meta.file_size;
        table.data_files.push(info);
    }
}

/// Build the database tree from routed buckets.
///
/// Buckets are folded in a fixed order: database schemas, table schemas,
/// view schemas, then data files.
pub(crate) fn assemble(
    buckets: Buckets,
    policy: DuplicatePolicy,
    charset: CharacterSet,
) -> LoaderResult<Vec<DatabaseMeta>> {
    let mut asm = Assembler::new(charset);

    for info in buckets.db_schemas {
        let path = info.file_meta.path.clone();
        let (_, exists) = asm.insert_db(info);
        if exists && policy.rejects_duplicates() {
            return Err(LoaderError::DuplicateDatabaseSchema { path });
        }
    }

    for info in buckets.table_schemas {
        let path = info.file_meta.path.clone();
        let (_, _, exists) = asm.insert_table(info);
        if exists && policy.rejects_duplicates() {
            return Err(LoaderError::DuplicateTableSchema { path });
        }
    }

    // tables that only have data files can host views as well
    let data_tables: HashSet<TableName> = buckets
        .table_datas
        .iter()
        .map(|info| info.table_name.clone())
        .collect();
    for info in buckets.view_schemas {
        let name = info.table_name.clone();
        let path = info.file_meta.path.clone();
        if !asm.insert_view(info, &data_tables) {
            return Err(LoaderError::OrphanView {
                schema: name.schema,
                view: name.name,
                path,
            });
        }
    }

    for info in buckets.table_datas {
        asm.append_data(info);
    }

    Ok(asm.dbs)
}
