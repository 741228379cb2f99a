pub mod resolver;
pub mod scanner;
pub mod synthesizer;

pub use resolver::{
    convert_table_name_to_new_alias, extend_sql_avoiding_table_naming_clashes, ResolvedJoins,
};
pub use scanner::{table_aliases_from_join_fragment, AliasRegistry};
pub use synthesizer::{JoinFragment, JoinFragmentSynthesizer};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::{AssociationKind, AssociationMetadata, EntityMetadata};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapses newlines and whitespace runs so fragments concatenate safely
pub fn normalize_whitespace(sql: &str) -> String {
    WHITESPACE.replace_all(sql.trim(), " ").into_owned()
}

/// ON condition linking `child_alias` rows to `parent_alias` rows through a
/// direct association declared on `parent`.
pub(crate) fn direct_join_condition(
    association: &AssociationMetadata,
    parent: &EntityMetadata,
    parent_alias: &str,
    child: &EntityMetadata,
    child_alias: &str,
) -> String {
    let foreign_key = association.resolved_foreign_key(parent);
    match association.kind {
        AssociationKind::BelongsTo => format!(
            "{}.{} = {}.{}",
            child_alias, child.primary_key, parent_alias, foreign_key
        ),
        _ => format!(
            "{}.{} = {}.{}",
            child_alias, foreign_key, parent_alias, parent.primary_key
        ),
    }
}
