//! Schema and table filters
//!
//! Two filter flavours are supported:
//! - `PatternFilter` - table-filter rules such as `db*.t?`, `!mysql.*` or
//!   `/^shard_\d+$/.*`. Later rules take precedence over earlier ones.
//! - `ReplicationRulesFilter` - the legacy `do-dbs` / `ignore-dbs` /
//!   `do-tables` / `ignore-tables` lists. A `~` prefix marks a regex.
//!
//! Both match case-insensitively unless built with `case_sensitive = true`.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, LoaderResult};

/// Filter rules applied when the configuration does not name any.
pub const DEFAULT_FILTER: &[&str] = &[
    "*.*",
    "!mysql.*",
    "!sys.*",
    "!INFORMATION_SCHEMA.*",
    "!PERFORMANCE_SCHEMA.*",
    "!METRICS_SCHEMA.*",
    "!INSPECTION_SCHEMA.*",
];

/// Decides whether a schema or table is part of the load
pub trait TableFilter: Send + Sync {
    fn match_schema(&self, schema: &str) -> bool;
    fn match_table(&self, schema: &str, table: &str) -> bool;
}

/// Translate a shell-style wildcard into an anchored regex source.
///
/// `*` and `?` become capture groups when `capture` is set so callers can
/// reference them from a template.
pub(crate) fn wildcard_to_regex(pattern: &str, capture: bool) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if capture => out.push_str("(.*)"),
            '*' => out.push_str(".*"),
            '?' if capture => out.push_str("(.)"),
            '?' => out.push('.'),
            '[' => {
                let class: String = chars.clone().take_while(|&c| c != ']').collect();
                let closed = chars.clone().nth(class.chars().count()) == Some(']');
                if closed && !class.is_empty() {
                    for _ in 0..=class.chars().count() {
                        chars.next();
                    }
                    out.push('[');
                    match class.strip_prefix('!') {
                        Some(rest) => {
                            out.push('^');
                            out.push_str(&rest.replace('\\', "\\\\"));
                        }
                        None => out.push_str(&class.replace('\\', "\\\\")),
                    }
                    out.push(']');
                } else {
                    out.push_str(r"\[");
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

pub(crate) fn build_regex(source: &str, case_sensitive: bool) -> LoaderResult<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| LoaderError::InvalidConfig(format!("invalid pattern '{}': {}", source, e)))
}

#[derive(Debug, Clone)]
struct FilterRule {
    positive: bool,
    schema: Regex,
    table: Regex,
    /// Table part is the bare `*` wildcard
    any_table: bool,
}

/// Split off one pattern component, either `/regex/` or a wildcard.
fn parse_component<'a>(
    input: &'a str,
    stop_at_dot: bool,
    rule: &str,
) -> LoaderResult<(String, &'a str)> {
    if let Some(rest) = input.strip_prefix('/') {
        let end = rest.find('/').ok_or_else(|| {
            LoaderError::InvalidConfig(format!("unterminated regex in filter rule '{}'", rule))
        })?;
        return Ok((rest[..end].to_string(), &rest[end + 1..]));
    }
    let end = if stop_at_dot {
        input.find('.').unwrap_or(input.len())
    } else {
        input.len()
    };
    Ok((wildcard_to_regex(&input[..end], false), &input[end..]))
}

fn parse_rule(rule: &str, case_sensitive: bool) -> LoaderResult<FilterRule> {
    let trimmed = rule.trim();
    let (positive, body) = match trimmed.strip_prefix('!') {
        Some(body) => (false, body),
        None => (true, trimmed),
    };

    let (schema, rest) = parse_component(body, true, rule)?;
    let Some(rest) = rest.strip_prefix('.') else {
        return Err(LoaderError::InvalidConfig(format!(
            "invalid filter rule '{}': expected `schema.table`",
            rule
        )));
    };
    let any_table = rest == "*";
    let (table, remaining) = parse_component(rest, false, rule)?;
    if !remaining.is_empty() {
        return Err(LoaderError::InvalidConfig(format!(
            "invalid filter rule '{}': unexpected '{}'",
            rule, remaining
        )));
    }

    Ok(FilterRule {
        positive,
        schema: build_regex(&schema, case_sensitive)?,
        table: build_regex(&table, case_sensitive)?,
        any_table,
    })
}

/// Filter built from table-filter rules
#[derive(Debug, Clone)]
pub struct PatternFilter {
    rules: Vec<FilterRule>,
}

impl PatternFilter {
    pub fn new<S: AsRef<str>>(rules: &[S], case_sensitive: bool) -> LoaderResult<Self> {
        let rules = rules
            .iter()
            .map(|r| r.as_ref())
            .filter(|r| !r.trim().is_empty() && !r.trim_start().starts_with('#'))
            .map(|r| parse_rule(r, case_sensitive))
            .collect::<LoaderResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Filter with [`DEFAULT_FILTER`]
    pub fn with_defaults(case_sensitive: bool) -> Self {
        // constant rules, covered by tests
        Self::new(DEFAULT_FILTER, case_sensitive).expect("default filter rules are valid")
    }
}

impl TableFilter for PatternFilter {
    fn match_schema(&self, schema: &str) -> bool {
        for rule in self.rules.iter().rev() {
            if !rule.schema.is_match(schema) {
                continue;
            }
            if rule.positive {
                return true;
            }
            // `!db.t1` still leaves other tables of `db`
            if rule.any_table {
                return false;
            }
        }
        false
    }

    fn match_table(&self, schema: &str, table: &str) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.schema.is_match(schema) && rule.table.is_match(table))
            .is_some_and(|rule| rule.positive)
    }
}

/// Legacy table reference inside the black-white-list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableRef {
    pub db_name: String,
    pub tbl_name: String,
}

/// Legacy replication rules (`[black-white-list]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BlackWhiteList {
    pub do_dbs: Vec<String>,
    pub ignore_dbs: Vec<String>,
    pub do_tables: Vec<TableRef>,
    pub ignore_tables: Vec<TableRef>,
}

impl BlackWhiteList {
    pub fn is_empty(&self) -> bool {
        self.do_tables.is_empty()
            && self.do_dbs.is_empty()
            && self.ignore_tables.is_empty()
            && self.ignore_dbs.is_empty()
    }
}

#[derive(Debug, Clone)]
struct NamePair {
    schema: Regex,
    table: Regex,
}

fn name_regex(name: &str, case_sensitive: bool) -> LoaderResult<Regex> {
    match name.strip_prefix('~') {
        Some(source) => build_regex(source, case_sensitive),
        None => build_regex(&wildcard_to_regex(name, false), case_sensitive),
    }
}

/// Filter built from [`BlackWhiteList`]
#[derive(Debug, Clone)]
pub struct ReplicationRulesFilter {
    do_dbs: Vec<Regex>,
    ignore_dbs: Vec<Regex>,
    do_tables: Vec<NamePair>,
    ignore_tables: Vec<NamePair>,
}

impl ReplicationRulesFilter {
    pub fn new(rules: &BlackWhiteList, case_sensitive: bool) -> LoaderResult<Self> {
        let dbs = |names: &[String]| {
            names
                .iter()
                .map(|n| name_regex(n, case_sensitive))
                .collect::<LoaderResult<Vec<_>>>()
        };
        let tables = |refs: &[TableRef]| {
            refs.iter()
                .map(|r| {
                    Ok(NamePair {
                        schema: name_regex(&r.db_name, case_sensitive)?,
                        table: name_regex(&r.tbl_name, case_sensitive)?,
                    })
                })
                .collect::<LoaderResult<Vec<_>>>()
        };

        Ok(Self {
            do_dbs: dbs(&rules.do_dbs)?,
            ignore_dbs: dbs(&rules.ignore_dbs)?,
            do_tables: tables(&rules.do_tables)?,
            ignore_tables: tables(&rules.ignore_tables)?,
        })
    }
}

impl TableFilter for ReplicationRulesFilter {
    fn match_schema(&self, schema: &str) -> bool {
        if !self.do_dbs.is_empty() {
            return self.do_dbs.iter().any(|r| r.is_match(schema));
        }
        !self.ignore_dbs.iter().any(|r| r.is_match(schema))
    }

    fn match_table(&self, schema: &str, table: &str) -> bool {
        if !self.match_schema(schema) {
            return false;
        }
        let matches = |pair: &NamePair| pair.schema.is_match(schema) && pair.table.is_match(table);
        if !self.do_tables.is_empty() {
            return self.do_tables.iter().any(matches);
        }
        !self.ignore_tables.iter().any(matches)
    }
}
