//! Integration tests for catalog loading

use std::sync::Arc;

use async_trait::async_trait;
use dump_catalog::error::StorageError;
use dump_catalog::source::{FileRouteRule, RouteResult, RouteRule};
use dump_catalog::storage::WalkVisitor;
use dump_catalog::{
    Catalog, CharacterSet, Classifier, Compression, DumpLoader, DuplicatePolicy, ErrorKind,
    LoaderConfig, LoaderError, LoaderResult, MemoryStorageBackend, PatternFilter, SourceType,
    StorageBackend, TableName,
};
use tokio_util::sync::CancellationToken;

fn storage(files: &[(&str, usize)]) -> MemoryStorageBackend {
    let storage = MemoryStorageBackend::new();
    for (path, size) in files {
        storage.insert_sized(*path, *size);
    }
    storage
}

fn schema_storage(files: &[(&str, &str)]) -> MemoryStorageBackend {
    MemoryStorageBackend::with_files(files.iter().map(|(p, c)| (p.to_string(), c.to_string())))
}

async fn load(storage: MemoryStorageBackend, config: &LoaderConfig) -> Catalog<MemoryStorageBackend> {
    DumpLoader::new(storage, config)
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap()
}

fn sharded_config() -> LoaderConfig {
    let mut config = LoaderConfig::new();
    config.routes.push(RouteRule {
        schema_pattern: "shard_*".to_string(),
        target_schema: "merged".to_string(),
        ..Default::default()
    });
    config
}

mod end_to_end_tests {
    use super::*;

    #[tokio::test]
    async fn test_small_tables_first_and_chunks_by_key() {
        let catalog = load(
            storage(&[
                ("db1-schema-create.sql", 10),
                ("db1.t1-schema.sql", 10),
                ("db1.t1.1.sql", 500),
                ("db1.t1.2.sql", 500),
                ("db1.t2-schema.sql", 10),
                ("db1.t2.1.sql", 100),
            ]),
            &LoaderConfig::new(),
        )
        .await;

        assert_eq!(catalog.databases().len(), 1);
        let db = &catalog.databases()[0];
        assert_eq!(db.name, "db1");

        let tables: Vec<(&str, u64)> = db
            .tables
            .iter()
            .map(|t| (t.name.as_str(), t.total_size))
            .collect();
        assert_eq!(tables, [("t2", 100), ("t1", 1000)]);

        let t1 = db.table("t1").unwrap();
        let paths: Vec<&str> = t1.data_files.iter().map(|f| f.file_meta.path.as_str()).collect();
        assert_eq!(paths, ["db1.t1.1.sql", "db1.t1.2.sql"]);
        assert_eq!(t1.schema_file.file_meta.path, "db1.t1-schema.sql");
        assert!(t1.is_row_ordered);
        assert_eq!(t1.index_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_file_kinds_and_compression() {
        let catalog = load(
            storage(&[
                ("db1.t1-schema.sql.gz", 10),
                ("db1.t1.000000001.csv.zst", 40),
                ("db1.t1.000000002.parquet", 60),
                ("db1.t1.sql.bak", 999),
                ("metadata", 5),
            ]),
            &LoaderConfig::new(),
        )
        .await;

        let t1 = catalog.database("db1").unwrap().table("t1").unwrap();
        assert_eq!(t1.schema_file.file_meta.compression, Compression::Gzip);
        assert_eq!(t1.data_files.len(), 2);
        assert_eq!(t1.data_files[0].file_meta.source_type, SourceType::Csv);
        assert_eq!(t1.data_files[0].file_meta.compression, Compression::Zstd);
        assert_eq!(t1.data_files[1].file_meta.source_type, SourceType::Parquet);
        assert_eq!(t1.total_size, 100);
    }

    #[tokio::test]
    async fn test_views_are_attached_to_database() {
        let catalog = load(
            storage(&[
                ("db1.t1-schema.sql", 10),
                ("db1.v1-schema.sql", 10),
                ("db1.v1-schema-view.sql", 10),
            ]),
            &LoaderConfig::new(),
        )
        .await;

        let db = catalog.database("db1").unwrap();
        assert_eq!(db.views.len(), 1);
        assert_eq!(db.views[0].name, "v1");
        assert_eq!(db.views[0].schema_file.file_meta.path, "db1.v1-schema-view.sql");
        assert_eq!(catalog.view_count(), 1);
    }
}

mod determinism_tests {
    use super::*;

    fn many_files() -> Vec<(String, usize)> {
        let mut files = Vec::new();
        for db in ["beta", "alpha"] {
            files.push((format!("{}/{}-schema-create.sql", db, db), 10));
            for (t, sizes) in [("t3", [7, 1, 7]), ("t1", [5, 5, 5]), ("t2", [2, 30, 1])] {
                files.push((format!("{}/{}.{}-schema.sql", db, db, t), 10));
                for (part, size) in sizes.iter().enumerate() {
                    files.push((format!("{}/{}.{}.{}.sql", db, db, t, part + 1), *size));
                }
            }
        }
        files
    }

    #[tokio::test]
    async fn test_repeated_loads_are_identical() {
        let files = many_files();
        let make = || {
            let storage = MemoryStorageBackend::new();
            for (path, size) in files.iter().rev() {
                storage.insert_sized(path.clone(), *size);
            }
            storage
        };

        let first = load(make(), &LoaderConfig::new()).await;
        let second = load(make(), &LoaderConfig::new()).await;
        assert_eq!(first.databases(), second.databases());
        assert_eq!(first.fingerprint(), second.fingerprint());

        // walk order decides database order: `alpha/` sorts before `beta/`
        let names: Vec<&str> = first.databases().iter().map(|db| db.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_shared_storage_reloads_to_same_catalog() {
        let storage = Arc::new(MemoryStorageBackend::new());
        for (path, size) in many_files() {
            storage.insert_sized(path, size);
        }
        let loader = DumpLoader::from_shared(Arc::clone(&storage), &LoaderConfig::new()).unwrap();
        let cancel = CancellationToken::new();
        let first = loader.load(&cancel).await.unwrap();
        let second = loader.load(&cancel).await.unwrap();
        assert_eq!(first.fingerprint(), second.fingerprint());

        storage.insert_sized("alpha/alpha.t1.4.sql", 1);
        let third = loader.load(&cancel).await.unwrap();
        assert_ne!(first.fingerprint(), third.fingerprint());
    }

    #[tokio::test]
    async fn test_size_and_sort_key_ordering() {
        let storage = MemoryStorageBackend::new();
        for (path, size) in many_files() {
            storage.insert_sized(path, size);
        }
        let catalog = load(storage, &LoaderConfig::new()).await;

        for db in catalog.databases() {
            assert!(db.tables.windows(2).all(|w| w[0].total_size <= w[1].total_size));
            for table in &db.tables {
                assert!(
                    table
                        .data_files
                        .windows(2)
                        .all(|w| w[0].file_meta.sort_key <= w[1].file_meta.sort_key)
                );
            }
        }
        // t1 and t3 tie at 15 bytes and keep their walk order
        let alpha: Vec<&str> = catalog.databases()[0]
            .tables
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(alpha, ["t1", "t3", "t2"]);
        assert_eq!(catalog.data_file_count(), 18);
    }
}

mod ceiling_tests {
    use super::*;

    #[tokio::test]
    async fn test_too_many_files_returns_partial_catalog() {
        let storage = MemoryStorageBackend::new();
        storage.insert_sized("db1-schema-create.sql", 10);
        for i in 0..10 {
            storage.insert_sized(format!("db1.t{}.sql", i), 100 - i);
        }
        let loader = DumpLoader::new(storage, &LoaderConfig::new())
            .unwrap()
            .with_max_scan_files(4);

        let failure = loader.load(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::TooManyFiles);
        assert!(matches!(failure.error, LoaderError::TooManySourceFiles { limit: 4 }));

        let partial = failure.partial.expect("partial catalog");
        let found = partial.data_file_count();
        assert!(found > 0 && found <= 4 && found < 10);
        // the partial catalog is still sorted
        let db = partial.database("db1").unwrap();
        assert!(db.tables.windows(2).all(|w| w[0].total_size <= w[1].total_size));
    }

    #[tokio::test]
    async fn test_ceiling_from_config() {
        let mut config = LoaderConfig::new();
        config.mydumper.max_scan_files = 1;
        let failure = DumpLoader::new(
            storage(&[("db1.t1.1.sql", 1), ("db1.t1.2.sql", 1)]),
            &config,
        )
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap_err();
        assert_eq!(failure.partial.unwrap().data_file_count(), 1);
    }

    #[tokio::test]
    async fn test_ignored_and_filtered_files_do_not_count() {
        let loader = DumpLoader::new(
            storage(&[
                ("db1.t1.1.sql", 1),
                ("metadata", 1),
                ("mysql.user.sql", 1),
                ("notes.txt", 1),
            ]),
            &LoaderConfig::new(),
        )
        .unwrap()
        .with_max_scan_files(1);
        let catalog = loader.load(&CancellationToken::new()).await.unwrap();
        assert_eq!(catalog.data_file_count(), 1);
    }
}

mod schema_error_tests {
    use super::*;

    #[tokio::test]
    async fn test_orphan_view_is_rejected() {
        let failure = DumpLoader::new(
            storage(&[("db1.t1-schema.sql", 1), ("db1.v1-schema-view.sql", 1)]),
            &LoaderConfig::new(),
        )
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::InvalidSchemaFile);
        assert!(failure.partial.is_none());
        let message = failure.to_string();
        assert!(message.contains("v1"), "{}", message);
        assert!(message.contains("db1.v1-schema-view.sql"), "{}", message);
    }

    #[tokio::test]
    async fn test_duplicate_database_schema_without_routing() {
        let failure = DumpLoader::new(
            storage(&[("a/db1-schema-create.sql", 1), ("b/db1-schema-create.sql", 1)]),
            &LoaderConfig::new(),
        )
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap_err();

        assert!(matches!(
            failure.error,
            LoaderError::DuplicateDatabaseSchema { ref path } if path == "b/db1-schema-create.sql"
        ));
        assert!(!failure.error.is_internal());
    }

    #[tokio::test]
    async fn test_duplicate_table_schema_without_routing() {
        let failure = DumpLoader::new(
            storage(&[("a/db1.t1-schema.sql", 1), ("b/db1.t1-schema.sql", 1)]),
            &LoaderConfig::new(),
        )
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap_err();
        assert!(matches!(failure.error, LoaderError::DuplicateTableSchema { .. }));
    }

    #[tokio::test]
    async fn test_invalid_file_classification() {
        let mut config = LoaderConfig::new();
        config.mydumper.files.push(FileRouteRule {
            pattern: r"^(\w+)\.(\w+)\.dat\.(\w+)$".to_string(),
            schema: "$1".to_string(),
            table: "$2".to_string(),
            file_type: "csv".to_string(),
            compression: "$3".to_string(),
            ..Default::default()
        });
        let failure = DumpLoader::new(storage(&[("db1.t1.dat.rar", 1)]), &config)
            .unwrap()
            .load(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Classification);
        assert!(failure.to_string().contains("db1.t1.dat.rar"));
    }
}

mod routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_routing_merges_sharded_databases() {
        let catalog = load(
            storage(&[
                ("shard_1-schema-create.sql", 1),
                ("shard_1.t-schema.sql", 1),
                ("shard_1.t.1.sql", 10),
                ("shard_2-schema-create.sql", 1),
                ("shard_2.t-schema.sql", 1),
                ("shard_2.t.1.sql", 20),
                ("other.x.sql", 5),
            ]),
            &sharded_config(),
        )
        .await;

        let names: Vec<&str> = catalog.databases().iter().map(|db| db.name.as_str()).collect();
        assert_eq!(names.iter().filter(|n| **n == "merged").count(), 1);
        assert!(names.contains(&"other"));
        assert!(!names.iter().any(|n| n.starts_with("shard_")));

        let merged = catalog.database("merged").unwrap();
        assert_eq!(merged.schema_file.file_meta.path, "shard_1-schema-create.sql");
        assert_eq!(merged.tables.len(), 1);
        let t = &merged.tables[0];
        assert_eq!(t.total_size, 30);
        assert_eq!(t.data_files.len(), 2);
        assert!(t.data_files.iter().all(|f| f.table_name == TableName::new("merged", "t")));
    }

    #[tokio::test]
    async fn test_chained_routes_without_database_schema_files() {
        let mut config = LoaderConfig::new();
        for (from, to) in [("x", "b"), ("b", "c")] {
            config.routes.push(RouteRule {
                schema_pattern: from.to_string(),
                target_schema: to.to_string(),
                ..Default::default()
            });
        }
        let catalog = load(
            storage(&[
                ("x.t1-schema.sql", 1),
                ("b.t2.1.sql", 2),
                ("b.t3.1.sql", 3),
                ("b.t4.1.sql", 4),
            ]),
            &config,
        )
        .await;

        let names: Vec<&str> = catalog.databases().iter().map(|db| db.name.as_str()).collect();
        assert_eq!(names, ["b", "c"]);
        let b = catalog.database("b").unwrap();
        assert_eq!(b.tables.len(), 1);
        assert_eq!(b.tables[0].name, "t1");
        assert!(!b.schema_file.file_meta.has_path());
        let c = catalog.database("c").unwrap();
        let tables: Vec<&str> = c.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tables, ["t2", "t3", "t4"]);
    }

    #[tokio::test]
    async fn test_routing_selects_merge_policy() {
        let loader = DumpLoader::new(MemoryStorageBackend::new(), &sharded_config()).unwrap();
        assert_eq!(loader.duplicate_policy(), DuplicatePolicy::AllowMergeViaRouting);
        let loader = DumpLoader::new(MemoryStorageBackend::new(), &LoaderConfig::new()).unwrap();
        assert_eq!(loader.duplicate_policy(), DuplicatePolicy::StrictUniqueness);
    }

    #[tokio::test]
    async fn test_routing_error_fails_load() {
        let mut config = LoaderConfig::new();
        config.routes.push(RouteRule {
            schema_pattern: "shard_*".to_string(),
            target_schema: "merged_$4".to_string(),
            ..Default::default()
        });
        let failure = DumpLoader::new(storage(&[("shard_1.t.sql", 1)]), &config)
            .unwrap()
            .load(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Routing);
        assert!(failure.partial.is_none());
    }

    #[test]
    fn test_routes_conflict_with_file_rules() {
        let mut config = sharded_config();
        config.mydumper.files.push(FileRouteRule {
            pattern: r"^x$".to_string(),
            file_type: "ignore".to_string(),
            ..Default::default()
        });
        let err = DumpLoader::new(MemoryStorageBackend::new(), &config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}

mod ddl_tests {
    use super::*;

    #[tokio::test]
    async fn test_database_ddl_synthesized_and_table_ddl_required() {
        let catalog = load(storage(&[("db1.t1.1.sql", 10)]), &LoaderConfig::new()).await;
        let cancel = CancellationToken::new();
        let db = catalog.database("db1").unwrap();

        let stmt = db.get_schema(catalog.storage().as_ref(), &cancel).await.unwrap();
        assert_eq!(stmt, "CREATE DATABASE IF NOT EXISTS `db1`");

        let err = db.tables[0]
            .get_schema(catalog.storage().as_ref(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::MissingTableSchema { .. }));
        assert_eq!(err.kind(), ErrorKind::MissingSchema);
    }

    #[tokio::test]
    async fn test_schema_text_is_extracted() {
        let catalog = load(
            schema_storage(&[
                ("db1-schema-create.sql", "/*!40101 SET NAMES binary*/;\nCREATE DATABASE `db1`;\n"),
                ("db1.t1-schema.sql", "-- table t1\nCREATE TABLE `t1` (\n  `id` INT\n);\n"),
            ]),
            &LoaderConfig::new(),
        )
        .await;
        let cancel = CancellationToken::new();
        let db = catalog.database("db1").unwrap();
        assert_eq!(
            db.get_schema(catalog.storage().as_ref(), &cancel).await.unwrap(),
            "/*!40101 SET NAMES binary*/;\nCREATE DATABASE `db1`;"
        );
        assert_eq!(
            db.tables[0].get_schema(catalog.storage().as_ref(), &cancel).await.unwrap(),
            "CREATE TABLE `t1` (\n`id` INT\n);"
        );
    }

    // Databases fall back on empty DDL text, tables return it unchanged.
    #[tokio::test]
    async fn test_empty_ddl_asymmetry() {
        let catalog = load(
            schema_storage(&[("db1-schema-create.sql", "\n\n"), ("db1.t1-schema.sql", "  \n")]),
            &LoaderConfig::new(),
        )
        .await;
        let cancel = CancellationToken::new();
        let db = catalog.database("db1").unwrap();
        assert_eq!(
            db.get_schema(catalog.storage().as_ref(), &cancel).await.unwrap(),
            "CREATE DATABASE IF NOT EXISTS `db1`"
        );
        assert_eq!(
            db.tables[0].get_schema(catalog.storage().as_ref(), &cancel).await.unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_removed_schema_file_is_reported() {
        let storage = Arc::new(schema_storage(&[("db1.t1-schema.sql", "CREATE TABLE t1 (id INT);")]));
        let loader = DumpLoader::from_shared(Arc::clone(&storage), &LoaderConfig::new()).unwrap();
        let cancel = CancellationToken::new();
        let catalog = loader.load(&cancel).await.unwrap();

        storage.remove("db1.t1-schema.sql");
        let table = &catalog.database("db1").unwrap().tables[0];
        let err = table.get_schema(catalog.storage().as_ref(), &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            LoaderError::SchemaFileNotFound { ref path, .. } if path == "db1.t1-schema.sql"
        ));
        assert!(err.to_string().contains("db1.t1-schema.sql"));
    }

    #[tokio::test]
    async fn test_latin1_schema_with_auto_charset() {
        let storage = MemoryStorageBackend::with_files([(
            "db1.t1-schema.sql",
            b"CREATE TABLE t1 (c VARCHAR(1) DEFAULT '\xE9');".to_vec(),
        )]);
        let catalog = load(storage, &LoaderConfig::new()).await;
        assert_eq!(catalog.charset(), CharacterSet::Auto);
        let stmt = catalog.databases()[0].tables[0]
            .get_schema(catalog.storage().as_ref(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(stmt.ends_with("DEFAULT 'é');"));
    }
}

mod filter_tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_filter_from_config() {
        let mut config = LoaderConfig::new();
        config.mydumper.filter = vec!["db1.*".to_string(), "!db1.skip".to_string()];
        let catalog = load(
            storage(&[
                ("db1-schema-create.sql", 1),
                ("db1.keep.sql", 1),
                ("db1.skip.sql", 1),
                ("db2-schema-create.sql", 1),
                ("db2.t.sql", 1),
            ]),
            &config,
        )
        .await;

        assert_eq!(catalog.databases().len(), 1);
        let db1 = catalog.database("db1").unwrap();
        assert!(db1.table("keep").is_some());
        assert!(db1.table("skip").is_none());
    }

    #[tokio::test]
    async fn test_legacy_black_white_list() {
        let mut config = LoaderConfig::new();
        config.black_white_list.ignore_dbs = vec!["~^tmp_".to_string()];
        let catalog = load(
            storage(&[("app.t.sql", 1), ("tmp_1.t.sql", 1)]),
            &config,
        )
        .await;
        assert!(catalog.database("app").is_some());
        assert!(catalog.database("tmp_1").is_none());
    }
}

mod collaborator_tests {
    use super::*;

    /// Treats `<schema>/<table>/<n>.csv` as data and everything else as noise
    struct DirectoryClassifier;

    impl Classifier for DirectoryClassifier {
        fn classify(&self, path: &str) -> LoaderResult<Option<RouteResult>> {
            let parts: Vec<&str> = path.split('/').collect();
            let [schema, table, file] = parts.as_slice() else {
                return Ok(None);
            };
            let Some(key) = file.strip_suffix(".csv") else {
                return Ok(None);
            };
            Ok(Some(RouteResult {
                table_name: TableName::new(*schema, *table),
                source_type: SourceType::Csv,
                compression: Compression::None,
                key: key.to_string(),
            }))
        }
    }

    #[tokio::test]
    async fn test_injected_classifier() {
        let storage = Arc::new(storage(&[
            ("sales/orders/2.csv", 5),
            ("sales/orders/1.csv", 5),
            ("sales/README", 1),
        ]));
        let loader = DumpLoader::from_parts(
            storage,
            Box::new(DirectoryClassifier),
            Box::new(PatternFilter::with_defaults(false)),
            None,
            CharacterSet::Utf8,
        );
        let catalog = loader.load(&CancellationToken::new()).await.unwrap();
        let orders = catalog.database("sales").unwrap().table("orders").unwrap();
        let keys: Vec<&str> = orders.data_files.iter().map(|f| f.file_meta.sort_key.as_str()).collect();
        assert_eq!(keys, ["1", "2"]);
    }

    struct BrokenStorage;

    #[async_trait]
    impl StorageBackend for BrokenStorage {
        async fn walk_dir(
            &self,
            _prefix: &str,
            _cancel: &CancellationToken,
            _visit: &mut WalkVisitor<'_>,
        ) -> Result<(), StorageError> {
            Err(StorageError::IoError("connection reset".to_string()))
        }

        async fn file_exists(&self, _path: &str) -> Result<bool, StorageError> {
            Ok(false)
        }

        async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::NotFound(path.to_string()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_wrapped() {
        let failure = DumpLoader::new(BrokenStorage, &LoaderConfig::new())
            .unwrap()
            .load(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Storage);
        assert!(failure.partial.is_none());
        assert_eq!(failure.to_string(), "list file failed: IO error: connection reset");
    }

    #[tokio::test]
    async fn test_cancelled_load_publishes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let failure = DumpLoader::new(storage(&[("db1.t1.sql", 1)]), &LoaderConfig::new())
            .unwrap()
            .load(&cancel)
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Cancelled);
        assert!(failure.partial.is_none());
    }
}
