//! Merging of independently generated JOIN fragments.

use log::debug;

use super::scanner::{
    parse_join_clauses, table_aliases_from_join_fragment, tokenize, Token, TokenKind,
};

/// Outcome of appending one fragment to another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedJoins {
    pub sql: String,
    /// `(old, new)` for every alias renamed in the base fragment
    pub renames: Vec<(String, String)>,
}

impl ResolvedJoins {
    /// Name `alias` ended up with after merging
    pub fn renamed(&self, alias: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|(old, _)| old.eq_ignore_ascii_case(alias))
            .map(|(_, new)| new.as_str())
    }
}

/// Appends `addition` to `base`, renaming aliases in `base` that clash with
/// the tables or aliases used by `addition`.
///
/// The addition is authoritative: it usually carries joins the caller wrote
/// by hand, so its names are never changed. Colliding base aliases become
/// `<rename_prefix>_<n>` with the smallest free `n` starting at 1.
pub fn extend_sql_avoiding_table_naming_clashes(
    base: Option<&str>,
    addition: Option<&str>,
    rename_prefix: &str,
) -> ResolvedJoins {
    let mut used = table_aliases_from_join_fragment(addition);
    let base_aliases = table_aliases_from_join_fragment(base);
    let mut sql = base.unwrap_or_default().trim().to_string();
    let mut renames = Vec::new();

    for alias in base_aliases.iter() {
        if !used.contains(alias) {
            used.insert(alias);
            continue;
        }
        let mut n = 0;
        let new_alias = loop {
            n += 1;
            let candidate = format!("{}_{}", rename_prefix, n);
            if !used.contains(&candidate) && !base_aliases.contains(&candidate) {
                break candidate;
            }
        };
        debug!("renaming clashing join alias '{}' to '{}'", alias, new_alias);
        sql = convert_table_name_to_new_alias(&sql, alias, &new_alias);
        used.insert(new_alias.clone());
        renames.push((alias.to_string(), new_alias));
    }

    let sql = [Some(sql.as_str()), addition]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    ResolvedJoins { sql, renames }
}

/// Rewrites every introduction of and reference to `old` in a fragment so
/// the table is known as `new_alias` instead.
///
/// - `JOIN t AS old` / `JOIN t old` become `JOIN t AS new_alias`
/// - `JOIN old ON ...` becomes `JOIN old AS new_alias ON ...`
/// - `old.column` becomes `new_alias.column`
/// - a stray `AS old` becomes `AS new_alias`
///
/// A join of a table named `old` that already carries a different alias is
/// left alone; references to `old` there point at some other table.
pub fn convert_table_name_to_new_alias(sql: &str, old: &str, new_alias: &str) -> String {
    let tokens = tokenize(sql);
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut claimed = vec![false; tokens.len()];

    for clause in parse_join_clauses(&tokens) {
        match (clause.alias, clause.as_keyword) {
            (Some(alias), as_keyword) if alias.ident().eq_ignore_ascii_case(old) => {
                let start = as_keyword.map(|t| t.start).unwrap_or(alias.start);
                edits.push((start, alias.end, format!("AS {}", new_alias)));
                mark(&mut claimed, &tokens, start, alias.end);
            }
            (Some(_), _) => {
                mark(&mut claimed, &tokens, tokens[clause.join].start, clause.table.end);
            }
            (None, _) if clause.table.ident().eq_ignore_ascii_case(old) => {
                edits.push((clause.table.end, clause.table.end, format!(" AS {}", new_alias)));
                mark(&mut claimed, &tokens, tokens[clause.join].start, clause.table.end);
            }
            (None, _) => {
                mark(&mut claimed, &tokens, tokens[clause.join].start, clause.table.end);
            }
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        if claimed[i] || !token.is_ident() || !token.ident().eq_ignore_ascii_case(old) {
            continue;
        }
        let next = tokens.get(i + 1);
        let prev = i.checked_sub(1).map(|p| tokens[p]);

        let is_reference = next.is_some_and(|n| n.is_punct('.') && n.start == token.end)
            && !prev.is_some_and(|p| p.is_punct('.') && p.end == token.start);
        let is_stray_alias = prev.is_some_and(|p| p.is_keyword("AS"));

        if is_reference || is_stray_alias {
            edits.push((token.start, token.end, new_alias.to_string()));
        }
    }

    let mut out = sql.to_string();
    edits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    for (start, end, replacement) in edits {
        out.replace_range(start..end, &replacement);
    }
    out
}

fn mark(claimed: &mut [bool], tokens: &[Token<'_>], start: usize, end: usize) {
    for (i, token) in tokens.iter().enumerate() {
        if token.start >= start && token.end <= end && token.kind != TokenKind::Literal {
            claimed[i] = true;
        }
    }
}
