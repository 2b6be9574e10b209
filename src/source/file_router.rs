//! File routing: classify dump files by name
//!
//! A `FileRouter` holds an ordered list of regex rules. The first rule whose
//! pattern matches a path decides the schema, table, kind, sort key and
//! compression of that file; the values are templates expanded from the
//! pattern's capture groups (`$1`, `${name}`).
//!
//! Default rules understand the Mydumper / Dumpling naming scheme:
//! - database: `{db}-schema-create.sql`
//! - table: `{db}.{table}-schema.sql`
//! - view: `{db}.{table}-schema-view.sql`
//! - data: `{db}.{table}.{part}.{sql|csv|parquet}` / `{db}.{table}.{sql|csv|parquet}`
//!
//! each optionally followed by a compression suffix such as `.gz`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::{Classifier, Compression, SourceType, TableName};
use crate::error::{LoaderError, LoaderResult};

const TYPE_IGNORE: &str = "ignore";

// Capture-group references in a template: `$1`, `${1}`, `$name`, `${name}`
static RE_TEMPLATE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z0-9_]+)\}|([A-Za-z0-9_]+))").expect("Invalid regex")
});

/// One user-facing file routing rule (`[[mydumper.files]]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileRouteRule {
    pub pattern: String,
    pub schema: String,
    pub table: String,
    /// `schema-schema`, `table-schema`, `view-schema`, `sql`, `csv`, `parquet` or `ignore`
    #[serde(rename = "type")]
    pub file_type: String,
    pub key: String,
    pub compression: String,
    /// Percent-decode the expanded schema and table names
    pub unescape: bool,
}

impl FileRouteRule {
    fn new(pattern: &str, schema: &str, table: &str, file_type: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            file_type: file_type.to_string(),
            ..Default::default()
        }
    }

    fn ignore(pattern: &str) -> Self {
        Self::new(pattern, "", "", TYPE_IGNORE)
    }

    fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    fn with_compression(mut self, compression: &str) -> Self {
        self.compression = compression.to_string();
        self
    }

    fn unescaped(mut self) -> Self {
        self.unescape = true;
        self
    }
}

/// Built-in rules for Mydumper / Dumpling output
pub fn default_file_rules() -> Vec<FileRouteRule> {
    vec![
        // triggers and post-load scripts are not schema definitions
        FileRouteRule::ignore(r"(?i).*(-schema-trigger|-schema-post)\.sql$"),
        // backups
        FileRouteRule::ignore(r"(?i).*\.(sql|csv|parquet)(\.(\w+))?\.(bak|BAK)$"),
        FileRouteRule::ignore(r"(?i)^(?:[^/]*/)*metadata$"),
        FileRouteRule::new(
            r"(?i)^(?:[^/]*/)*([^/.]+)-schema-create\.sql(?:\.(\w*?))?$",
            "$1",
            "",
            "schema-schema",
        )
        .with_compression("$2")
        .unescaped(),
        FileRouteRule::new(
            r"(?i)^(?:[^/]*/)*([^/.]+)\.(.*?)-schema\.sql(?:\.(\w*?))?$",
            "$1",
            "$2",
            "table-schema",
        )
        .with_compression("$3")
        .unescaped(),
        FileRouteRule::new(
            r"(?i)^(?:[^/]*/)*([^/.]+)\.(.*?)-schema-view\.sql(?:\.(\w*?))?$",
            "$1",
            "$2",
            "view-schema",
        )
        .with_compression("$3")
        .unescaped(),
        FileRouteRule::new(
            r"(?i)^(?:[^/]*/)*([^/.]+)\.(.*?)(?:\.([0-9]+))?\.(sql|csv|parquet)(?:\.(\w+))?$",
            "$1",
            "$2",
            "$4",
        )
        .with_key("$3")
        .with_compression("$5")
        .unescaped(),
    ]
}

/// Classification of one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResult {
    pub table_name: TableName,
    pub source_type: SourceType,
    pub compression: Compression,
    /// Sort key ordering data chunks of the same table
    pub key: String,
}

#[derive(Debug)]
struct CompiledRule {
    regex: Regex,
    rule: FileRouteRule,
}

impl CompiledRule {
    fn compile(rule: &FileRouteRule) -> LoaderResult<Self> {
        let regex = Regex::new(&rule.pattern).map_err(|e| {
            LoaderError::InvalidConfig(format!(
                "parse file routing rule failed: invalid pattern '{}': {}",
                rule.pattern, e
            ))
        })?;

        for template in [
            &rule.schema,
            &rule.table,
            &rule.file_type,
            &rule.key,
            &rule.compression,
        ] {
            check_template(&regex, template).map_err(|message| {
                LoaderError::InvalidConfig(format!(
                    "parse file routing rule failed for pattern '{}': {}",
                    rule.pattern, message
                ))
            })?;
        }

        if rule.file_type.is_empty() {
            return Err(LoaderError::InvalidConfig(format!(
                "file routing rule '{}' has no type",
                rule.pattern
            )));
        }
        if !rule.file_type.contains('$') && !rule.file_type.eq_ignore_ascii_case(TYPE_IGNORE) {
            rule.file_type
                .parse::<SourceType>()
                .map_err(LoaderError::InvalidConfig)?;
        }
        if !rule.compression.contains('$') {
            rule.compression
                .parse::<Compression>()
                .map_err(LoaderError::InvalidConfig)?;
        }

        Ok(Self {
            regex,
            rule: rule.clone(),
        })
    }
}

/// Verify every capture group a template references exists in `regex`.
fn check_template(regex: &Regex, template: &str) -> Result<(), String> {
    for caps in RE_TEMPLATE_REF.captures_iter(template) {
        let Some(reference) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let reference = reference.as_str();
        let known = match reference.parse::<usize>() {
            Ok(index) => index < regex.captures_len(),
            Err(_) => regex.capture_names().flatten().any(|n| n == reference),
        };
        if !known {
            return Err(format!(
                "template '{}' references unknown capture group '{}'",
                template, reference
            ));
        }
    }
    Ok(())
}

fn expand(caps: &Captures<'_>, template: &str) -> String {
    let mut out = String::new();
    caps.expand(template, &mut out);
    out
}

fn unescape_name(path: &str, name: String) -> LoaderResult<String> {
    urlencoding::decode(&name)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| LoaderError::FileRoute {
            path: path.to_string(),
            message: format!("cannot unescape '{}': {}", name, e),
        })
}

/// Ordered set of compiled file routing rules
#[derive(Debug)]
pub struct FileRouter {
    rules: Vec<CompiledRule>,
}

impl FileRouter {
    /// Compile `rules` in order. Fails on the first invalid rule.
    pub fn new(rules: &[FileRouteRule]) -> LoaderResult<Self> {
        let rules = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<LoaderResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Router with only the built-in Mydumper / Dumpling rules
    pub fn with_default_rules() -> Self {
        // built-in rules are static and covered by tests
        Self::new(&default_file_rules()).expect("default file rules are valid")
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify `path`. `Ok(None)` means no rule matched or an ignore rule did.
    pub fn route(&self, path: &str) -> LoaderResult<Option<RouteResult>> {
        let Some((compiled, caps)) = self
            .rules
            .iter()
            .find_map(|r| r.regex.captures(path).map(|caps| (r, caps)))
        else {
            return Ok(None);
        };
        let rule = &compiled.rule;

        let file_type = expand(&caps, &rule.file_type);
        if file_type.eq_ignore_ascii_case(TYPE_IGNORE) {
            return Ok(None);
        }
        let source_type = file_type
            .parse::<SourceType>()
            .map_err(|message| LoaderError::FileRoute {
                path: path.to_string(),
                message,
            })?;
        let compression = expand(&caps, &rule.compression)
            .parse::<Compression>()
            .map_err(|message| LoaderError::FileRoute {
                path: path.to_string(),
                message,
            })?;

        let mut schema = expand(&caps, &rule.schema);
        let mut table = expand(&caps, &rule.table);
        if rule.unescape {
            schema = unescape_name(path, schema)?;
            table = unescape_name(path, table)?;
        }

        Ok(Some(RouteResult {
            table_name: TableName::new(schema, table),
            source_type,
            compression,
            key: expand(&caps, &rule.key),
        }))
    }
}

impl Classifier for FileRouter {
    fn classify(&self, path: &str) -> LoaderResult<Option<RouteResult>> {
        self.route(path)
    }
}
