//! Alias scanning for raw JOIN fragments.
//!
//! This is not a SQL parser. It understands just enough of a fragment to
//! find the tables a JOIN introduces and the names they are known by:
//!
//! ```text
//! join      := JOIN table [ [AS] alias ]
//! table     := ident { "." ident }
//! alias     := ident            -- any word except a reserved one (ON, USING, FORCE, ...)
//! reference := ident "." ident
//! ident     := word | `quoted word` | "quoted word"
//! ```
//!
//! Everything else in the fragment (join conditions, literals, operators)
//! is tokenized only so that spans line up for rewriting.

/// Words that can follow a table name in a JOIN and are never aliases
const RESERVED: &[&str] = &[
    "ON", "USING", "LEFT", "RIGHT", "INNER", "OUTER", "CROSS", "FULL", "NATURAL", "JOIN",
    "STRAIGHT_JOIN", "WHERE", "GROUP", "ORDER", "LIMIT", "UNION", "FORCE", "USE", "IGNORE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word,
    Quoted,
    Literal,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a> {
    pub fn is_ident(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::Quoted)
    }

    /// Identifier text with surrounding quotes removed
    pub fn ident(&self) -> &'a str {
        match self.kind {
            TokenKind::Quoted => {
                // An unterminated identifier runs to the end of the fragment
                let Some(quote) = self.text.chars().next() else {
                    return self.text;
                };
                let inner = &self.text[quote.len_utf8()..];
                inner.strip_suffix(quote).unwrap_or(inner)
            }
            _ => self.text,
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(c)
    }

    fn is_reserved(&self) -> bool {
        self.kind == TokenKind::Word && RESERVED.iter().any(|kw| self.text.eq_ignore_ascii_case(kw))
    }

    fn can_alias(&self) -> bool {
        self.is_ident() && !self.is_reserved()
    }
}

pub(crate) fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        let (kind, end) = match c {
            '`' | '"' => {
                let end = sql[start + 1..]
                    .find(c)
                    .map(|offset| start + 1 + offset + 1)
                    .unwrap_or(sql.len());
                (TokenKind::Quoted, end)
            }
            '\'' => {
                // '' inside a literal is an escaped quote
                let mut end = sql.len();
                let mut i = start + 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        if bytes.get(i + 1) == Some(&b'\'') {
                            i += 2;
                            continue;
                        }
                        end = i + 1;
                        break;
                    }
                    i += 1;
                }
                (TokenKind::Literal, end)
            }
            c if is_word_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if !is_word_char(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                (TokenKind::Word, end)
            }
            c => (TokenKind::Punct, start + c.len_utf8()),
        };
        // Skip whatever a quoted token or literal swallowed
        while let Some(&(i, _)) = chars.peek() {
            if i >= end {
                break;
            }
            chars.next();
        }
        tokens.push(Token {
            kind,
            text: &sql[start..end],
            start,
            end,
        });
    }
    tokens
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// One `JOIN <table> [AS <alias>]` introduction found in a fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JoinClause<'a> {
    /// Index of the JOIN keyword token
    pub join: usize,
    /// Last identifier of a possibly schema-qualified table name
    pub table: Token<'a>,
    pub as_keyword: Option<Token<'a>>,
    pub alias: Option<Token<'a>>,
}

impl<'a> JoinClause<'a> {
    /// The alias if there is one, else the raw table name
    pub fn effective_name(&self) -> &'a str {
        self.alias.unwrap_or(self.table).ident()
    }
}

pub(crate) fn parse_join_clauses<'a>(tokens: &[Token<'a>]) -> Vec<JoinClause<'a>> {
    let mut clauses = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if !tokens[i].is_keyword("JOIN") {
            i += 1;
            continue;
        }
        let join = i;
        let mut j = i + 1;
        // Subqueries and malformed fragments have no table token
        let Some(first) = tokens.get(j).filter(|t| t.is_ident() && !t.is_reserved()) else {
            i += 1;
            continue;
        };
        let mut table = *first;
        j += 1;
        while j + 1 < tokens.len() && tokens[j].is_punct('.') && tokens[j + 1].is_ident() {
            table = tokens[j + 1];
            j += 2;
        }

        let mut as_keyword = None;
        if tokens.get(j).is_some_and(|t| t.is_keyword("AS")) {
            as_keyword = Some(tokens[j]);
            j += 1;
        }
        let alias = tokens.get(j).filter(|t| t.can_alias()).copied();
        if alias.is_some() {
            j += 1;
        }

        clauses.push(JoinClause {
            join,
            table,
            as_keyword,
            alias,
        });
        i = j;
    }
    clauses
}

/// Ordered set of the table names/aliases used by a fragment.
///
/// Names compare case-insensitively; quoting is already stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasRegistry {
    names: Vec<String>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Returns false when the name was already present
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_disjoint(&self, other: &AliasRegistry) -> bool {
        !self.iter().any(|name| other.contains(name))
    }

    pub fn into_vec(self) -> Vec<String> {
        self.names
    }
}

/// Returns the names (or aliases if used) of each table a JOIN fragment
/// introduces. Blank or absent input yields an empty registry.
pub fn table_aliases_from_join_fragment(sql: Option<&str>) -> AliasRegistry {
    let mut registry = AliasRegistry::new();
    let Some(sql) = sql.filter(|s| !s.trim().is_empty()) else {
        return registry;
    };
    let tokens = tokenize(sql);
    for clause in parse_join_clauses(&tokens) {
        registry.insert(clause.effective_name());
    }
    registry
}
