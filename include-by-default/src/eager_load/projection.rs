//! Column projection for tables joined outside the native planner.
//!
//! Manually joined tables contribute no columns to the SELECT list on their
//! own. Their columns are appended here under the same `t<N>_r<M>` scheme the
//! native planner uses, so hydration cannot tell them apart.

use once_cell::sync::Lazy;
use regex::Regex;

use super::plan::EagerLoadPlan;
use crate::schema::SchemaRegistry;
use crate::types::ConfigurationError;

static COLUMN_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bt(\d+)_r(\d+)\b").unwrap());
static EXACT_COLUMN_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^t(\d+)_r(\d+)$").unwrap());

pub fn column_alias(table_index: usize, column_index: usize) -> String {
    format!("t{}_r{}", table_index, column_index)
}

/// Highest `(table, column)` index pair used in a column-alias list
pub fn last_column_alias(sql: &str) -> Option<(usize, usize)> {
    COLUMN_ALIAS
        .captures_iter(sql)
        .filter_map(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .max()
}

/// Table index encoded in a single `t<N>_r<M>` alias
pub fn column_alias_table_index(alias: &str) -> Option<usize> {
    EXACT_COLUMN_ALIAS
        .captures(alias)
        .and_then(|caps| caps[1].parse().ok())
}

/// Appends `alias.column AS t<N>_r<M>` for every column of every planned
/// target. Table indexes continue after the highest one already in `sql`.
/// Records the first emitted alias on each plan entry.
pub fn column_aliases_with_eager_loading_from_joins(
    sql: &str,
    plan: &mut EagerLoadPlan,
    schema: &SchemaRegistry,
    quote: &dyn Fn(&str) -> String,
) -> Result<String, ConfigurationError> {
    if plan.is_empty() {
        return Ok(sql.to_string());
    }
    let next_table = last_column_alias(sql).map_or(0, |(table, _)| table + 1);

    let mut columns: Vec<String> = Vec::new();
    if !sql.trim().is_empty() {
        columns.push(sql.trim().to_string());
    }
    for (i, entry) in plan.entries_mut().iter_mut().enumerate() {
        let entity = schema.entity(&entry.class_name)?;
        for (j, column_name) in entity.columns.iter().enumerate() {
            let alias = column_alias(next_table + i, j);
            entry.set_first_column(alias.as_str());
            columns.push(format!("{}.{} AS {}", entry.table_alias, quote(column_name), alias));
        }
    }
    Ok(columns.join(", "))
}
