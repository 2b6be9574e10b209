//! Catalog loading
//!
//! `DumpLoader` discovers the databases, tables, views and data files of a
//! dump source. One load runs four passes in order:
//! 1. scan - walk storage once, classify and filter every file
//! 2. route - rename files through the table router, if one is configured
//! 3. assemble - fold the files into the database / table / view tree
//! 4. sort - small tables first, data files by sort key
//!
//! Loads are deterministic: the same source and configuration always give the
//! same catalog in the same order.

mod assemble;
mod catalog;
mod route_pass;
mod scan;
mod sort;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::LoaderConfig;
use crate::error::{LoadFailure, LoaderError, LoaderResult};
use crate::source::{CharacterSet, Classifier, NameRouter, TableFilter};
use crate::storage::StorageBackend;

pub use assemble::DuplicatePolicy;
pub use catalog::{Catalog, DatabaseMeta, TableMeta, ViewMeta};

/// Loader bound to one storage source and one configuration
pub struct DumpLoader<B: StorageBackend> {
    storage: Arc<B>,
    classifier: Box<dyn Classifier>,
    filter: Box<dyn TableFilter>,
    router: Option<Box<dyn NameRouter>>,
    policy: DuplicatePolicy,
    charset: CharacterSet,
    max_scan_files: usize,
}

impl<B: StorageBackend> DumpLoader<B> {
    /// Create a loader from a configuration
    pub fn new(storage: B, config: &LoaderConfig) -> LoaderResult<Self> {
        Self::from_shared(Arc::new(storage), config)
    }

    /// Create a loader over storage shared with other loads
    pub fn from_shared(storage: Arc<B>, config: &LoaderConfig) -> LoaderResult<Self> {
        config.validate()?;
        let classifier = config.build_file_router()?;
        let filter = config.build_filter()?;
        let router = config.build_router()?;
        info!(
            "loader setup: {} file routing rules, {} table routing rules, character set {}",
            classifier.rule_count(),
            config.routes.len(),
            config.mydumper.character_set
        );

        Ok(Self::from_parts(
            storage,
            Box::new(classifier),
            filter,
            router,
            config.mydumper.character_set,
        )
        .with_max_scan_files(config.mydumper.max_scan_files))
    }

    /// Create a loader from explicit collaborators
    pub fn from_parts(
        storage: Arc<B>,
        classifier: Box<dyn Classifier>,
        filter: Box<dyn TableFilter>,
        router: Option<Box<dyn NameRouter>>,
        charset: CharacterSet,
    ) -> Self {
        let policy = DuplicatePolicy::for_routing(router.is_some());
        Self {
            storage,
            classifier,
            filter,
            router,
            policy,
            charset,
            max_scan_files: 0,
        }
    }

    /// Limit the number of classified files a load accepts (0 = unbounded)
    pub fn with_max_scan_files(mut self, max_scan_files: usize) -> Self {
        self.max_scan_files = max_scan_files;
        self
    }

    pub fn storage(&self) -> &Arc<B> {
        &self.storage
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Discover the catalog.
    ///
    /// On [`LoaderError::TooManySourceFiles`] the files found before the limit
    /// are still routed, assembled and sorted, and returned as
    /// `LoadFailure::partial`. Every other error yields no catalog.
    pub async fn load(&self, cancel: &CancellationToken) -> Result<Catalog<B>, LoadFailure<B>> {
        let scanned = scan::scan(
            self.storage.as_ref(),
            self.classifier.as_ref(),
            self.filter.as_ref(),
            self.max_scan_files,
            cancel,
        )
        .await?;
        let mut buckets = scanned.buckets;

        if let Some(router) = &self.router {
            route_pass::route_buckets(&mut buckets, router.as_ref())?;
        }

        let mut databases = assemble::assemble(buckets, self.policy, self.charset)?;
        sort::sort_databases(&mut databases);

        if cancel.is_cancelled() {
            return Err(LoaderError::Cancelled.into());
        }

        let catalog = Catalog::new(databases, Arc::clone(&self.storage), self.charset);
        info!(
            "Loaded {} databases, {} tables, {} views and {} data files",
            catalog.databases().len(),
            catalog.table_count(),
            catalog.view_count(),
            catalog.data_file_count()
        );

        match scanned.overflow {
            Some(error) => Err(LoadFailure {
                error,
                partial: Some(catalog),
            }),
            None => Ok(catalog),
        }
    }
}
