use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Raw result row keyed by column alias
pub type Row = Map<String, Value>;

/// Loaded value of one association slot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Loaded {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Loaded {
    pub fn empty_for(collection: bool) -> Self {
        if collection {
            Self::Many(Vec::new())
        } else {
            Self::One(None)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::One(record) => usize::from(record.is_some()),
            Self::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A hydrated entity with its eagerly loaded associations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub entity: String,
    pub attributes: Map<String, Value>,
    pub associations: BTreeMap<String, Loaded>,
}

impl Record {
    pub fn new(entity: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            entity: entity.into(),
            attributes,
            associations: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    pub fn id(&self, primary_key: &str) -> Option<&Value> {
        self.get(primary_key).filter(|v| !v.is_null())
    }

    /// Whether the association was eagerly loaded, even if it came back empty
    pub fn is_loaded(&self, association: &str) -> bool {
        self.associations.contains_key(association)
    }

    pub fn association(&self, name: &str) -> Option<&Loaded> {
        self.associations.get(name)
    }

    pub fn many(&self, name: &str) -> &[Record] {
        match self.associations.get(name) {
            Some(Loaded::Many(records)) => records,
            _ => &[],
        }
    }

    pub fn one(&self, name: &str) -> Option<&Record> {
        match self.associations.get(name) {
            Some(Loaded::One(record)) => record.as_deref(),
            _ => None,
        }
    }

    pub fn set_association(&mut self, name: impl Into<String>, loaded: Loaded) {
        self.associations.insert(name.into(), loaded);
    }
}
