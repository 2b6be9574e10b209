//! Loader configuration file support
//!
//! Handles parsing of `dump-catalog.toml` configuration files and
//! environment variable overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, LoaderResult};
use crate::source::{
    BlackWhiteList, CharacterSet, DEFAULT_FILTER, FileRouteRule, FileRouter, NameRouter,
    PatternFilter, ReplicationRulesFilter, RouteRule, RouteTable, TableFilter,
    file_router::default_file_rules,
};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "dump-catalog.toml";

/// Environment variable for the source directory
pub const ENV_SOURCE_DIR: &str = "DUMP_CATALOG_SOURCE_DIR";

/// Environment variable for the schema file character set
pub const ENV_CHARACTER_SET: &str = "DUMP_CATALOG_CHARACTER_SET";

/// Environment variable for the scan ceiling
pub const ENV_MAX_SCAN_FILES: &str = "DUMP_CATALOG_MAX_SCAN_FILES";

/// Source location and file interpretation (`[mydumper]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MydumperSection {
    /// Directory holding the dump
    #[serde(default)]
    pub source_dir: String,

    #[serde(default)]
    pub character_set: CharacterSet,

    /// Match filter and route patterns case-sensitively
    #[serde(default)]
    pub case_sensitive: bool,

    /// Append the built-in Mydumper / Dumpling file rules after `files`
    #[serde(default = "default_file_rules_enabled")]
    pub default_file_rules: bool,

    /// Table-filter rules
    #[serde(default = "default_filter")]
    pub filter: Vec<String>,

    /// Maximum number of classified files, 0 = unbounded
    #[serde(default)]
    pub max_scan_files: usize,

    /// User file routing rules
    #[serde(default)]
    pub files: Vec<FileRouteRule>,
}

fn default_file_rules_enabled() -> bool {
    true
}

fn default_filter() -> Vec<String> {
    DEFAULT_FILTER.iter().map(|s| s.to_string()).collect()
}

impl Default for MydumperSection {
    fn default() -> Self {
        Self {
            source_dir: String::new(),
            character_set: CharacterSet::default(),
            case_sensitive: false,
            default_file_rules: default_file_rules_enabled(),
            filter: default_filter(),
            max_scan_files: 0,
            files: Vec::new(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `dump-catalog.toml` configuration file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoaderConfig {
    #[serde(default)]
    pub mydumper: MydumperSection,

    /// Table routing rules
    #[serde(default)]
    pub routes: Vec<RouteRule>,

    /// Legacy replication rules, used instead of `mydumper.filter` when set
    #[serde(default)]
    pub black_white_list: BlackWhiteList,
}

impl LoaderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration reading from `source_dir`
    pub fn for_source(source_dir: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.mydumper.source_dir = source_dir.into();
        config
    }

    /// Load a configuration file and apply environment overrides
    pub fn load(config_path: &Path) -> LoaderResult<Self> {
        let content = std::fs::read_to_string(config_path).map_err(|e| {
            LoaderError::InvalidConfig(format!(
                "Failed to read config {}: {}",
                config_path.display(),
                e
            ))
        })?;

        let mut config = Self::parse(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> LoaderResult<Self> {
        toml::from_str(content)
            .map_err(|e| LoaderError::InvalidConfig(format!("Failed to parse config: {}", e)))
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> LoaderResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            LoaderError::InvalidConfig(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> LoaderResult<()> {
        if let Ok(dir) = std::env::var(ENV_SOURCE_DIR) {
            self.mydumper.source_dir = dir;
        }

        if let Ok(charset) = std::env::var(ENV_CHARACTER_SET) {
            self.mydumper.character_set = charset.parse().map_err(|e| {
                LoaderError::InvalidConfig(format!("{}: {}", ENV_CHARACTER_SET, e))
            })?;
        }

        if let Ok(max) = std::env::var(ENV_MAX_SCAN_FILES) {
            self.mydumper.max_scan_files = max.parse().map_err(|e| {
                LoaderError::InvalidConfig(format!("{}: {}", ENV_MAX_SCAN_FILES, e))
            })?;
        }
        Ok(())
    }

    pub fn has_legacy_black_white_list(&self) -> bool {
        !self.black_white_list.is_empty()
    }

    /// Reject option combinations that cannot be honored together
    pub fn validate(&self) -> LoaderResult<()> {
        if !self.routes.is_empty() && !self.mydumper.files.is_empty() {
            return Err(LoaderError::ConfigConflict(
                "table route is deprecated, can't config both [routes] and [mydumper.files]"
                    .to_string(),
            ));
        }
        if self.has_legacy_black_white_list() && self.mydumper.filter != default_filter() {
            return Err(LoaderError::ConfigConflict(
                "`mydumper.filter` and `black-white-list` cannot be set at the same time"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Build the schema / table filter. Legacy lists win when present.
    pub fn build_filter(&self) -> LoaderResult<Box<dyn TableFilter>> {
        let case_sensitive = self.mydumper.case_sensitive;
        if self.has_legacy_black_white_list() {
            let filter = ReplicationRulesFilter::new(&self.black_white_list, case_sensitive)?;
            Ok(Box::new(filter))
        } else {
            let filter = PatternFilter::new(&self.mydumper.filter, case_sensitive)?;
            Ok(Box::new(filter))
        }
    }

    /// Build the table router, `None` when no routes are configured
    pub fn build_router(&self) -> LoaderResult<Option<Box<dyn NameRouter>>> {
        if self.routes.is_empty() {
            return Ok(None);
        }
        let router = RouteTable::new(&self.routes, self.mydumper.case_sensitive)?;
        Ok(Some(Box::new(router)))
    }

    /// Build the file classifier from user rules plus, optionally, the defaults
    pub fn build_file_router(&self) -> LoaderResult<FileRouter> {
        let mut rules = self.mydumper.files.clone();
        if self.mydumper.default_file_rules {
            rules.extend(default_file_rules());
        }
        FileRouter::new(&rules)
    }
}
