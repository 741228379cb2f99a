//! Default eager-loading for an ORM finder.
//!
//! Every entity can declare associations it always eager-loads. When joining
//! them naively makes the database reject the statement (two includes that
//! go through the same join table, say), the finder retries once with
//! hand-built joins whose aliases cannot clash, and still hydrates the
//! associations from the extra columns.

pub mod config;
pub mod eager_load;
pub mod finder;
pub mod join_fragments;
pub mod registry;
pub mod schema;
pub mod types;

pub use config::IncludeByDefaultConfig;
pub use eager_load::{EagerLoadEntry, EagerLoadPlan, JoinDependency, Loaded, Record, Row};
pub use finder::{
    convert_problematic_includes_to_joins, DefaultIncludeFinder, FindOptions, FindScope, Finder,
    IncludeSpec, QueryContext, SeaOrmFinder,
};
pub use join_fragments::{
    convert_table_name_to_new_alias, extend_sql_avoiding_table_naming_clashes,
    table_aliases_from_join_fragment, AliasRegistry, JoinFragment, JoinFragmentSynthesizer,
    ResolvedJoins,
};
pub use registry::DefaultIncludeRegistry;
pub use schema::{AssociationKind, AssociationMetadata, EntityMetadata, SchemaRegistry};
pub use types::*;

use sea_orm::DatabaseBackend;

/// Quotes a column name for `backend`, doubling any embedded quote
pub fn quote_column_name(backend: DatabaseBackend, name: &str) -> String {
    match backend {
        DatabaseBackend::MySql => format!("`{}`", name.replace('`', "``")),
        _ => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_column_name() {
        assert_eq!(quote_column_name(DatabaseBackend::Sqlite, "id"), "\"id\"");
        assert_eq!(quote_column_name(DatabaseBackend::Postgres, "a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_column_name(DatabaseBackend::MySql, "order"), "`order`");
    }
}
