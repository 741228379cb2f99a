use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};
use sea_orm::{ConnectionTrait, DatabaseBackend, FromQueryResult, Statement};
use serde_json::Value as JsonValue;

use super::{FindOptions, Finder, QueryContext};
use crate::config::IncludeByDefaultConfig;
use crate::eager_load::{column_aliases_with_eager_loading_from_joins, JoinDependency, Record, Row};
use crate::join_fragments::extend_sql_avoiding_table_naming_clashes;
use crate::schema::SchemaRegistry;
use crate::join_fragments::scanner::tokenize;
use crate::types::{FindError, IncludeResult};

/// [`Finder`] that builds one eager-loading statement and runs it on a
/// sea-orm connection
pub struct SeaOrmFinder<C: ConnectionTrait> {
    conn: C,
    schema: Arc<SchemaRegistry>,
    config: Arc<IncludeByDefaultConfig>,
}

impl<C: ConnectionTrait> SeaOrmFinder<C> {
    /// `config` should be the same `Arc` the decorating
    /// [`DefaultIncludeFinder`](super::DefaultIncludeFinder) holds, so both
    /// rename clashing aliases with the same prefix.
    pub fn new(conn: C, schema: Arc<SchemaRegistry>, config: Arc<IncludeByDefaultConfig>) -> Self {
        Self {
            conn,
            schema,
            config,
        }
    }

    async fn fetch_rows(
        &self,
        sql: String,
        values: Vec<sea_orm::Value>,
        context: &mut QueryContext,
    ) -> IncludeResult<Vec<Row>> {
        trace!("executing: {}", sql);
        context.record_statement(sql.clone());
        let stmt = Statement::from_sql_and_values(self.conn.get_database_backend(), sql, values);
        let rows = self.conn.query_all(stmt).await?;

        rows.iter()
            .map(|row| match JsonValue::from_query_result(row, "") {
                Ok(JsonValue::Object(map)) => Ok(map),
                Ok(other) => Err(FindError::hydration(format!("unexpected row shape: {}", other))),
                Err(err) => Err(FindError::hydration(err.to_string())),
            })
            .collect()
    }
}

#[async_trait]
impl<C> Finder for SeaOrmFinder<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find_every(
        &self,
        entity: &str,
        options: &FindOptions,
        context: &mut QueryContext,
    ) -> IncludeResult<Vec<Record>> {
        let backend = self.conn.get_database_backend();
        let quote = |name: &str| crate::quote_column_name(backend, name);

        let mut dependency = JoinDependency::new(&self.schema, entity, &options.merged_includes())?;
        let base = dependency.base();

        let columns = column_aliases_with_eager_loading_from_joins(
            &dependency.column_aliases(&quote),
            &mut context.plan,
            &self.schema,
            &quote,
        )?;
        let joins = extend_sql_avoiding_table_naming_clashes(
            options.scope_joins(),
            options.joins.as_deref(),
            &self.config.renamed_alias_prefix,
        );
        let from = [
            base.table_name.to_string(),
            dependency.join_sql(),
            joins.sql,
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        let mut conditions: Vec<String> = options.merged_conditions().into_iter().collect();
        let mut values = Vec::new();
        let mut paging = limit_clause(backend, options.limit, options.offset);

        // Collection joins multiply rows, so LIMIT has to pick base ids first
        let limited = paging.is_some() && (dependency.has_collection_joins() || !context.plan.is_empty());
        if limited {
            let pk = format!("{}.{}", base.table_name, quote(base.primary_key));
            let mut projection = vec![format!("{} AS {}", pk, quote("id"))];
            // DISTINCT needs every ORDER BY expression in its select list
            if let Some(order) = options.order.as_deref() {
                projection.extend(
                    order_expressions(order)
                        .into_iter()
                        .enumerate()
                        .map(|(i, expr)| format!("{} AS {}", expr, quote(&format!("alias_{}", i)))),
                );
            }
            let mut sql = format!("SELECT DISTINCT {} FROM {}", projection.join(", "), from);
            push_clauses(&mut sql, &conditions, options.order.as_deref(), paging.as_deref());

            // Ordering by a joined column can repeat an id
            let mut seen = HashSet::new();
            let ids: Vec<sea_orm::Value> = self
                .fetch_rows(sql, Vec::new(), context)
                .await?
                .iter()
                .filter_map(|row| row.get("id"))
                .filter(|id| seen.insert(id.to_string()))
                .filter_map(bind_value)
                .collect();
            if ids.is_empty() {
                debug!("limited find on {} matched no ids", entity);
                return Ok(Vec::new());
            }
            conditions.push(format!("{} IN ({})", pk, placeholders(backend, ids.len())));
            values = ids;
            paging = None;
        }

        let mut sql = format!("SELECT {} FROM {}", columns, from);
        push_clauses(&mut sql, &conditions, options.order.as_deref(), paging.as_deref());
        let rows = self.fetch_rows(sql, values, context).await?;

        dependency.register_converted_associations(&rows, &context.plan)?;
        dependency.instantiate(&rows)
    }
}

fn push_clauses(sql: &mut String, conditions: &[String], order: Option<&str>, paging: Option<&str>) {
    match conditions {
        [] => {}
        [only] => {
            sql.push_str(" WHERE ");
            sql.push_str(only);
        }
        many => {
            let joined = many.iter().map(|c| format!("({})", c)).collect::<Vec<_>>();
            sql.push_str(" WHERE ");
            sql.push_str(&joined.join(" AND "));
        }
    }
    if let Some(order) = order.filter(|o| !o.trim().is_empty()) {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(paging) = paging {
        sql.push(' ');
        sql.push_str(paging);
    }
}

/// Splits an ORDER BY list into its expressions, dropping direction and
/// NULLS placement. Commas inside parentheses or quotes do not split.
fn order_expressions(order: &str) -> Vec<&str> {
    let tokens = tokenize(order);
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut term_start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth = depth.saturating_sub(1);
        } else if token.is_punct(',') && depth == 0 {
            terms.push(&tokens[term_start..i]);
            term_start = i + 1;
        }
    }
    terms.push(&tokens[term_start..]);

    terms
        .into_iter()
        .filter_map(|term| {
            let keep = term.len()
                - term
                    .iter()
                    .rev()
                    .take_while(|t| {
                        ["ASC", "DESC", "NULLS", "FIRST", "LAST"]
                            .iter()
                            .any(|kw| t.is_keyword(kw))
                    })
                    .count();
            let expr = &term[..keep];
            Some(&order[expr.first()?.start..expr.last()?.end])
        })
        .collect()
}

fn limit_clause(backend: DatabaseBackend, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
    match (limit, offset) {
        (None, None) => None,
        (Some(limit), None) => Some(format!("LIMIT {}", limit)),
        (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
        (None, Some(offset)) => Some(match backend {
            DatabaseBackend::Postgres => format!("OFFSET {}", offset),
            DatabaseBackend::MySql => format!("LIMIT 18446744073709551615 OFFSET {}", offset),
            _ => format!("LIMIT -1 OFFSET {}", offset),
        }),
    }
}

fn placeholders(backend: DatabaseBackend, count: usize) -> String {
    (1..=count)
        .map(|i| match backend {
            DatabaseBackend::Postgres => format!("${}", i),
            _ => "?".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind_value(value: &JsonValue) -> Option<sea_orm::Value> {
    match value {
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(i.into()),
            None => n.as_f64().map(Into::into),
        },
        JsonValue::String(s) => Some(s.clone().into()),
        JsonValue::Bool(b) => Some((*b).into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clause() {
        assert_eq!(limit_clause(DatabaseBackend::Sqlite, None, None), None);
        assert_eq!(
            limit_clause(DatabaseBackend::Sqlite, Some(5), Some(10)).as_deref(),
            Some("LIMIT 5 OFFSET 10")
        );
        assert_eq!(
            limit_clause(DatabaseBackend::Sqlite, None, Some(3)).as_deref(),
            Some("LIMIT -1 OFFSET 3")
        );
        assert_eq!(
            limit_clause(DatabaseBackend::Postgres, None, Some(3)).as_deref(),
            Some("OFFSET 3")
        );
    }

    #[test]
    fn test_order_expressions() {
        assert_eq!(order_expressions("posts.title"), vec!["posts.title"]);
        assert_eq!(
            order_expressions("posts.title DESC, COALESCE(a, b) ASC NULLS LAST"),
            vec!["posts.title", "COALESCE(a, b)"]
        );
        assert_eq!(order_expressions("\"a, b\" desc,  posts.id"), vec!["\"a, b\"", "posts.id"]);
        assert!(order_expressions("  ").is_empty());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(DatabaseBackend::Sqlite, 3), "?, ?, ?");
        assert_eq!(placeholders(DatabaseBackend::Postgres, 2), "$1, $2");
    }

    #[test]
    fn test_bind_value() {
        assert_eq!(bind_value(&serde_json::json!(7)), Some(sea_orm::Value::from(7i64)));
        assert_eq!(bind_value(&JsonValue::Null), None);
    }

    #[test]
    fn test_push_clauses() {
        let mut sql = "SELECT * FROM posts".to_string();
        push_clauses(
            &mut sql,
            &["posts.id > 1".to_string(), "posts.id < 9".to_string()],
            Some("posts.id DESC"),
            Some("LIMIT 2"),
        );
        assert_eq!(
            sql,
            "SELECT * FROM posts WHERE (posts.id > 1) AND (posts.id < 9) ORDER BY posts.id DESC LIMIT 2"
        );
    }
}
