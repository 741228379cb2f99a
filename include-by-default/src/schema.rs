//! Entity and association metadata read by the eager-load rewriting layer.
//! The ORM core fills a [`SchemaRegistry`] at startup; nothing here changes
//! afterwards.

use std::borrow::Cow;

use heck::{ToPascalCase, ToSnakeCase};

use crate::types::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    HasAndBelongsToMany,
    HasManyThrough,
}

/// The three shapes the rewriting layer distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Direct,
    ManyToMany,
    HasManyThrough,
}

impl AssociationKind {
    pub fn cardinality(self) -> Cardinality {
        match self {
            Self::BelongsTo | Self::HasOne | Self::HasMany => Cardinality::Direct,
            Self::HasAndBelongsToMany => Cardinality::ManyToMany,
            Self::HasManyThrough => Cardinality::HasManyThrough,
        }
    }

    /// Whether eager loading this kind multiplies rows of the owner
    pub fn is_collection(self) -> bool {
        !matches!(self, Self::BelongsTo | Self::HasOne)
    }
}

/// Association descriptor. Read-only, never created by the rewriting layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationMetadata {
    pub name: &'static str,
    /// Owning entity, filled in when the association is attached
    pub owner: &'static str,
    pub kind: AssociationKind,
    /// Target entity name
    pub class_name: Cow<'static, str>,
    pub foreign_key: Option<&'static str>,
    pub association_foreign_key: Option<&'static str>,
    pub join_table: Option<&'static str>,
    pub through: Option<&'static str>,
    pub source: Option<&'static str>,
}

impl AssociationMetadata {
    fn new(name: &'static str, kind: AssociationKind, class_name: &'static str) -> Self {
        Self {
            name,
            owner: "",
            kind,
            class_name: Cow::Borrowed(class_name),
            foreign_key: None,
            association_foreign_key: None,
            join_table: None,
            through: None,
            source: None,
        }
    }

    pub fn belongs_to(name: &'static str, class_name: &'static str) -> Self {
        Self::new(name, AssociationKind::BelongsTo, class_name)
    }

    pub fn has_one(name: &'static str, class_name: &'static str) -> Self {
        Self::new(name, AssociationKind::HasOne, class_name)
    }

    pub fn has_many(name: &'static str, class_name: &'static str) -> Self {
        Self::new(name, AssociationKind::HasMany, class_name)
    }

    pub fn has_and_belongs_to_many(name: &'static str, class_name: &'static str) -> Self {
        Self::new(name, AssociationKind::HasAndBelongsToMany, class_name)
    }

    /// The target class is only known once the source association on the
    /// through entity is resolved; `class_name` here is the naming guess.
    pub fn has_many_through(name: &'static str, through: &'static str) -> Self {
        let mut association = Self::new(name, AssociationKind::HasManyThrough, "");
        association.through = Some(through);
        association
    }

    pub fn class_name(mut self, class_name: &'static str) -> Self {
        self.class_name = Cow::Borrowed(class_name);
        self
    }

    pub fn foreign_key(mut self, column: &'static str) -> Self {
        self.foreign_key = Some(column);
        self
    }

    pub fn association_foreign_key(mut self, column: &'static str) -> Self {
        self.association_foreign_key = Some(column);
        self
    }

    pub fn join_table(mut self, table: &'static str) -> Self {
        self.join_table = Some(table);
        self
    }

    pub fn source(mut self, source: &'static str) -> Self {
        self.source = Some(source);
        self
    }

    /// Foreign key column, falling back to the naming convention
    pub fn resolved_foreign_key(&self, owner: &EntityMetadata) -> String {
        if let Some(fk) = self.foreign_key {
            return fk.to_string();
        }
        match self.kind {
            AssociationKind::BelongsTo => format!("{}_id", self.name.to_snake_case()),
            _ => format!("{}_id", owner.name.to_snake_case()),
        }
    }

    pub fn resolved_association_foreign_key(&self, target: &EntityMetadata) -> String {
        match self.association_foreign_key {
            Some(fk) => fk.to_string(),
            None => format!("{}_id", target.name.to_snake_case()),
        }
    }

    /// Join table name; by convention both table names sorted and joined by `_`
    pub fn resolved_join_table(&self, owner: &EntityMetadata, target: &EntityMetadata) -> String {
        if let Some(table) = self.join_table {
            return table.to_string();
        }
        let mut tables = [owner.table_name, target.table_name];
        tables.sort_unstable();
        tables.join("_")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    pub name: &'static str,
    pub table_name: &'static str,
    pub primary_key: &'static str,
    pub columns: Vec<&'static str>,
    pub associations: Vec<AssociationMetadata>,
}

impl EntityMetadata {
    pub fn new(name: &'static str, table_name: &'static str) -> Self {
        Self {
            name,
            table_name,
            primary_key: "id",
            columns: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: &'static str) -> Self {
        self.primary_key = column;
        self
    }

    pub fn columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        self.columns = columns.into_iter().collect();
        self
    }

    pub fn association(mut self, mut association: AssociationMetadata) -> Self {
        association.owner = self.name;
        if association.class_name.is_empty() {
            association.class_name = Cow::Owned(singularize(association.name).to_pascal_case());
        }
        self.associations.push(association);
        self
    }

    /// Looks an association up by name, accepting any casing of the name
    pub fn reflect_on_association(&self, name: &str) -> Option<&AssociationMetadata> {
        if let Some(association) = self.associations.iter().find(|a| a.name == name) {
            return Some(association);
        }
        let snake = name.to_snake_case();
        self.associations
            .iter()
            .find(|a| a.name.to_snake_case() == snake)
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Static schema metadata for every entity the finder knows about
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: Vec<EntityMetadata>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, entity: EntityMetadata) -> Self {
        self.entities.retain(|e| e.name != entity.name);
        self.entities.push(entity);
        self
    }

    /// Namespace-aware entity lookup
    pub fn find_entity(&self, entity_name: &str) -> Option<&EntityMetadata> {
        // Try exact match first
        if let Some(meta) = self.entities.iter().find(|meta| meta.name == entity_name) {
            return Some(meta);
        }
        // "blog::Post" -> "Post"
        if let Some(colon_pos) = entity_name.rfind("::") {
            let name_without_namespace = &entity_name[colon_pos + 2..];
            if let Some(meta) = self
                .entities
                .iter()
                .find(|meta| meta.name == name_without_namespace)
            {
                return Some(meta);
            }
        }
        // "post" / "blog_post" -> "Post" / "BlogPost"
        let pascal_case = entity_name.to_pascal_case();
        self.entities.iter().find(|meta| meta.name == pascal_case)
    }

    pub fn entity(&self, entity_name: &str) -> Result<&EntityMetadata, ConfigurationError> {
        self.find_entity(entity_name)
            .ok_or_else(|| ConfigurationError::entity_not_found(entity_name))
    }

    pub fn reflect_on_association(
        &self,
        entity_name: &str,
        association: &str,
    ) -> Result<&AssociationMetadata, ConfigurationError> {
        let entity = self.entity(entity_name)?;
        entity
            .reflect_on_association(association)
            .ok_or_else(|| ConfigurationError::association_not_found(entity.name, association))
    }

    /// Target entity of a direct or many-to-many association
    pub fn target_of(
        &self,
        association: &AssociationMetadata,
    ) -> Result<&EntityMetadata, ConfigurationError> {
        self.entity(&association.class_name)
    }
}

/// Singular form of a pluralized collection name. Covers the regular
/// English endings only.
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let len = word.len();
    if lower.ends_with("ies") && len > 3 {
        format!("{}y", &word[..len - 3])
    } else if ["sses", "shes", "ches", "xes", "zes"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        word[..len - 2].to_string()
    } else if lower.ends_with("ss") || lower.ends_with("us") {
        word.to_string()
    } else if lower.ends_with('s') && len > 1 {
        word[..len - 1].to_string()
    } else {
        word.to_string()
    }
}
