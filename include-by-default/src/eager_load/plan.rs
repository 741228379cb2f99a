use crate::join_fragments::JoinFragment;

/// One association that was moved out of `include` and into a synthesized
/// join, and must be put back into the object graph after the query runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerLoadEntry {
    pub class_name: String,
    pub table_alias: String,
    pub association: String,
    /// Alias of the first projected column; set once, when columns are known
    pub first_column: Option<String>,
}

impl EagerLoadEntry {
    /// Records the first projected column. Later calls are ignored.
    pub fn set_first_column(&mut self, column: impl Into<String>) -> bool {
        if self.first_column.is_some() {
            return false;
        }
        self.first_column = Some(column.into());
        true
    }
}

impl From<&JoinFragment> for EagerLoadEntry {
    fn from(fragment: &JoinFragment) -> Self {
        Self {
            class_name: fragment.class_name.clone(),
            table_alias: fragment.table_alias.clone(),
            association: fragment.association.clone(),
            first_column: None,
        }
    }
}

/// Accumulated synthesized associations of a single finder call.
///
/// Request-scoped: it travels inside the query context and is dropped with
/// it, so concurrent finds on the same entity never see each other's plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EagerLoadPlan {
    entries: Vec<EagerLoadEntry>,
}

impl EagerLoadPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: EagerLoadEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[EagerLoadEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [EagerLoadEntry] {
        &mut self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Follows a rename made while merging join fragments
    pub fn rename_table_alias(&mut self, old: &str, new: &str) {
        for entry in &mut self.entries {
            if entry.table_alias.eq_ignore_ascii_case(old) {
                entry.table_alias = new.to_string();
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
