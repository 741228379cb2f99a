use serde::{Deserialize, Serialize};

/// One entry of an `include` list: a plain association name, or an
/// association with its own nested includes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncludeSpec {
    Association(String),
    Nested {
        name: String,
        include: Vec<IncludeSpec>,
    },
}

impl IncludeSpec {
    pub fn association(name: impl Into<String>) -> Self {
        Self::Association(name.into())
    }

    pub fn nested(name: impl Into<String>, include: Vec<IncludeSpec>) -> Self {
        Self::Nested {
            name: name.into(),
            include,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Association(name) | Self::Nested { name, .. } => name,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, Self::Nested { .. })
    }
}

impl From<&str> for IncludeSpec {
    fn from(name: &str) -> Self {
        Self::Association(name.to_string())
    }
}

/// Options inherited from an enclosing scope (e.g. an association proxy)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindScope {
    pub include: Option<Vec<IncludeSpec>>,
    pub joins: Option<String>,
    pub conditions: Option<String>,
}

impl FindScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, include: Vec<IncludeSpec>) -> Self {
        self.include = Some(include);
        self
    }

    pub fn joins(mut self, joins: impl Into<String>) -> Self {
        self.joins = Some(joins.into());
        self
    }

    pub fn conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }
}

/// Options bag of a "find every matching record" call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub include: Option<Vec<IncludeSpec>>,
    /// Raw JOIN fragment; its aliases win over anything generated
    pub joins: Option<String>,
    pub conditions: Option<String>,
    pub order: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub scope: Option<FindScope>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<IncludeSpec>,
    {
        self.include = Some(include.into_iter().map(Into::into).collect());
        self
    }

    pub fn joins(mut self, joins: impl Into<String>) -> Self {
        self.joins = Some(joins.into());
        self
    }

    pub fn conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn scope(mut self, scope: FindScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn scope_joins(&self) -> Option<&str> {
        self.scope.as_ref().and_then(|s| s.joins.as_deref())
    }

    /// Scope includes followed by call includes, without duplicates
    pub fn merged_includes(&self) -> Vec<IncludeSpec> {
        let scoped = self.scope.as_ref().and_then(|s| s.include.as_ref());
        let mut merged: Vec<IncludeSpec> = Vec::new();
        for spec in scoped.into_iter().chain(self.include.as_ref()).flatten() {
            if !merged.contains(spec) {
                merged.push(spec.clone());
            }
        }
        merged
    }

    /// Scope conditions and call conditions joined with AND
    pub fn merged_conditions(&self) -> Option<String> {
        let scoped = self.scope.as_ref().and_then(|s| s.conditions.as_deref());
        let parts: Vec<&str> = [scoped, self.conditions.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        match parts.len() {
            0 => None,
            1 => Some(parts[0].to_string()),
            _ => Some(
                parts
                    .iter()
                    .map(|c| format!("({})", c))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        }
    }
}
