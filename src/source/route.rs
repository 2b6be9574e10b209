//! Table routing: rename (schema, table) pairs
//!
//! Route rules match a schema wildcard and optionally a table wildcard.
//! Targets may reference the wildcard captures of the matched patterns:
//! `$1`.. number the schema captures first, then the table captures.
//!
//! ```toml
//! [[routes]]
//! schema-pattern = "shard_*"
//! table-pattern = "orders_*"
//! target-schema = "merged"
//! target-table = "orders"
//! ```

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::filter::{build_regex, wildcard_to_regex};
use crate::error::{LoaderError, LoaderResult};

/// Renames (schema, table) pairs
pub trait NameRouter: Send + Sync {
    /// Route `(schema, table)`. `table` is empty for database-level entries.
    fn route(&self, schema: &str, table: &str) -> LoaderResult<(String, String)>;
}

/// One `[[routes]]` rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RouteRule {
    pub schema_pattern: String,
    pub table_pattern: String,
    pub target_schema: String,
    pub target_table: String,
}

#[derive(Debug)]
struct CompiledRoute {
    schema: Regex,
    table: Option<Regex>,
    rule: RouteRule,
}

impl CompiledRoute {
    fn compile(rule: &RouteRule, case_sensitive: bool) -> LoaderResult<Self> {
        if rule.schema_pattern.is_empty() {
            return Err(LoaderError::InvalidConfig(
                "invalid table route rule: schema-pattern is empty".to_string(),
            ));
        }
        let schema = build_regex(&wildcard_to_regex(&rule.schema_pattern, true), case_sensitive)?;
        let table = if rule.table_pattern.is_empty() {
            None
        } else {
            Some(build_regex(
                &wildcard_to_regex(&rule.table_pattern, true),
                case_sensitive,
            )?)
        };
        Ok(Self {
            schema,
            table,
            rule: rule.clone(),
        })
    }

    fn matches<'s, 't>(
        &self,
        schema: &'s str,
        table: &'t str,
    ) -> Option<(Captures<'s>, Option<Captures<'t>>)> {
        let schema_caps = self.schema.captures(schema)?;
        match &self.table {
            Some(_) if table.is_empty() => None,
            Some(pattern) => Some((schema_caps, Some(pattern.captures(table)?))),
            None => Some((schema_caps, None)),
        }
    }
}

/// Expand `$N` / `${N}` in `template` from the wildcard captures.
fn expand_target(template: &str, groups: &[&str]) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (digits, consumed) = if let Some(braced) = after.strip_prefix('{') {
            let end = braced
                .find('}')
                .ok_or_else(|| format!("unterminated capture reference in '{}'", template))?;
            (&braced[..end], end + 2)
        } else {
            let end = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        if digits.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }
        let index: usize = digits
            .parse()
            .map_err(|_| format!("malformed capture reference '${}'", digits))?;
        let value = index
            .checked_sub(1)
            .and_then(|i| groups.get(i))
            .ok_or_else(|| {
                format!(
                    "capture group ${} does not exist, the patterns have {} wildcard(s)",
                    index,
                    groups.len()
                )
            })?;
        out.push_str(value);
        rest = &after[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Ordered table routing rules
#[derive(Debug)]
pub struct RouteTable {
    table_rules: Vec<CompiledRoute>,
    schema_rules: Vec<CompiledRoute>,
}

impl RouteTable {
    pub fn new(rules: &[RouteRule], case_sensitive: bool) -> LoaderResult<Self> {
        let mut table_rules = Vec::new();
        let mut schema_rules = Vec::new();
        for rule in rules {
            let compiled = CompiledRoute::compile(rule, case_sensitive)?;
            if compiled.table.is_some() {
                table_rules.push(compiled);
            } else {
                schema_rules.push(compiled);
            }
        }
        Ok(Self {
            table_rules,
            schema_rules,
        })
    }
}

impl NameRouter for RouteTable {
    fn route(&self, schema: &str, table: &str) -> LoaderResult<(String, String)> {
        let Some((compiled, (schema_caps, table_caps))) = self
            .table_rules
            .iter()
            .chain(self.schema_rules.iter())
            .find_map(|r| r.matches(schema, table).map(|caps| (r, caps)))
        else {
            return Ok((schema.to_string(), table.to_string()));
        };

        let groups: Vec<&str> = schema_caps
            .iter()
            .skip(1)
            .chain(table_caps.iter().flat_map(|c| c.iter().skip(1)))
            .map(|m| m.map_or("", |m| m.as_str()))
            .collect();

        let route_error = |message: String| LoaderError::TableRoute {
            schema: schema.to_string(),
            table: table.to_string(),
            message: format!(
                "rule `{}`.`{}`: {}",
                compiled.rule.schema_pattern, compiled.rule.table_pattern, message
            ),
        };

        let target_schema = if compiled.rule.target_schema.is_empty() {
            schema.to_string()
        } else {
            expand_target(&compiled.rule.target_schema, &groups).map_err(route_error)?
        };
        let target_table = if compiled.rule.target_table.is_empty() || table.is_empty() {
            table.to_string()
        } else {
            expand_target(&compiled.rule.target_table, &groups).map_err(route_error)?
        };
        Ok((target_schema, target_table))
    }
}
