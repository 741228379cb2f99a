//! JOIN fragments for associations the native eager-load planner cannot
//! alias safely.

use log::trace;

use super::{direct_join_condition, normalize_whitespace};
use crate::config::IncludeByDefaultConfig;
use crate::schema::{
    singularize, AssociationKind, AssociationMetadata, Cardinality, EntityMetadata, SchemaRegistry,
};
use crate::types::ConfigurationError;

/// A synthesized `LEFT OUTER JOIN` chain plus what is needed to project the
/// target's columns later on. Lives for a single query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinFragment {
    pub sql: String,
    pub association: String,
    /// Target entity name
    pub class_name: String,
    /// Alias of the table holding target rows
    pub table_alias: String,
    /// Alias of the intermediate (join or through) table
    pub join_table_alias: String,
    pub index: usize,
}

pub struct JoinFragmentSynthesizer<'a> {
    schema: &'a SchemaRegistry,
    config: &'a IncludeByDefaultConfig,
}

impl<'a> JoinFragmentSynthesizer<'a> {
    pub fn new(schema: &'a SchemaRegistry, config: &'a IncludeByDefaultConfig) -> Self {
        Self { schema, config }
    }

    /// Builds the fragment for `association` using `index` for its aliases.
    ///
    /// Returns `Ok(None)` for direct associations, which the native planner
    /// handles itself.
    pub fn synthesize(
        &self,
        owner: &EntityMetadata,
        association: &AssociationMetadata,
        index: usize,
    ) -> Result<Option<JoinFragment>, ConfigurationError> {
        let fragment = match association.kind.cardinality() {
            Cardinality::ManyToMany => self.has_and_belongs_to_many(owner, association, index)?,
            Cardinality::HasManyThrough => self.has_many_through(owner, association, index)?,
            Cardinality::Direct => return Ok(None),
        };
        trace!("synthesized join for {}.{}: {}", owner.name, association.name, fragment.sql);
        Ok(Some(fragment))
    }

    fn has_and_belongs_to_many(
        &self,
        owner: &EntityMetadata,
        association: &AssociationMetadata,
        index: usize,
    ) -> Result<JoinFragment, ConfigurationError> {
        let target = self.schema.target_of(association)?;

        let join_table = association.resolved_join_table(owner, target);
        let join_table_alias = self.config.join_table_alias(index);
        let join_foreign_key = association.resolved_foreign_key(owner);
        let assoc_table_alias = self.config.assoc_table_alias(index);
        let assoc_foreign_key = association.resolved_association_foreign_key(target);

        let sql = format!(
            "
            LEFT OUTER JOIN {join_table} AS {join_table_alias}
              ON {join_table_alias}.{join_foreign_key} = {owner_table}.{owner_pk}
            LEFT OUTER JOIN {assoc_table} AS {assoc_table_alias}
              ON {assoc_table_alias}.{assoc_pk} = {join_table_alias}.{assoc_foreign_key}
            ",
            owner_table = owner.table_name,
            owner_pk = owner.primary_key,
            assoc_table = target.table_name,
            assoc_pk = target.primary_key,
        );

        Ok(JoinFragment {
            sql: normalize_whitespace(&sql),
            association: association.name.to_string(),
            class_name: target.name.to_string(),
            table_alias: assoc_table_alias,
            join_table_alias,
            index,
        })
    }

    fn has_many_through(
        &self,
        owner: &EntityMetadata,
        association: &AssociationMetadata,
        index: usize,
    ) -> Result<JoinFragment, ConfigurationError> {
        let ThroughChain {
            through_assoc,
            through_entity,
            source_assoc,
            source_entity,
        } = resolve_through_chain(self.schema, owner, association)?;

        let join_table_alias = self.config.join_table_alias(index);
        let assoc_table_alias = self.config.assoc_table_alias(index);

        let through_condition = direct_join_condition(
            through_assoc,
            owner,
            owner.table_name,
            through_entity,
            &join_table_alias,
        );
        let source_condition = direct_join_condition(
            source_assoc,
            through_entity,
            &join_table_alias,
            source_entity,
            &assoc_table_alias,
        );

        let sql = format!(
            "
            LEFT OUTER JOIN {join_table} AS {join_table_alias}
              ON {through_condition}
            LEFT OUTER JOIN {assoc_table} AS {assoc_table_alias}
              ON {source_condition}
            ",
            join_table = through_entity.table_name,
            assoc_table = source_entity.table_name,
        );

        Ok(JoinFragment {
            sql: normalize_whitespace(&sql),
            association: association.name.to_string(),
            class_name: source_entity.name.to_string(),
            table_alias: assoc_table_alias,
            join_table_alias,
            index,
        })
    }
}

/// The two hops of a has-many-through association
#[derive(Debug, Clone, Copy)]
pub(crate) struct ThroughChain<'s> {
    /// Association on the owner leading to the intermediate entity
    pub through_assoc: &'s AssociationMetadata,
    pub through_entity: &'s EntityMetadata,
    /// Association on the intermediate entity leading to the target
    pub source_assoc: &'s AssociationMetadata,
    pub source_entity: &'s EntityMetadata,
}

pub(crate) fn resolve_through_chain<'s>(
    schema: &'s SchemaRegistry,
    owner: &'s EntityMetadata,
    association: &AssociationMetadata,
) -> Result<ThroughChain<'s>, ConfigurationError> {
    let through_name = association.through.unwrap_or_default();
    let through_assoc = owner.reflect_on_association(through_name).ok_or_else(|| {
        ConfigurationError::ThroughAssociationNotFound {
            entity: owner.name.to_string(),
            association: association.name.to_string(),
            through: through_name.to_string(),
        }
    })?;
    if through_assoc.kind.cardinality() != Cardinality::Direct {
        return Err(ConfigurationError::invalid_configuration(
            format!("{}.{}", owner.name, association.name),
            format!("through association '{}' must be direct", through_assoc.name),
        ));
    }
    let through_entity = schema.target_of(through_assoc)?;
    let source_assoc = source_association(through_entity, association)?;
    let source_entity = schema.target_of(source_assoc)?;
    Ok(ThroughChain {
        through_assoc,
        through_entity,
        source_assoc,
        source_entity,
    })
}

/// Finds the association on the through entity that leads to the final
/// target: an explicit `source` first, then the association's own name,
/// then its singular form (`tags` -> `tag`).
fn source_association<'s>(
    through_entity: &'s EntityMetadata,
    association: &AssociationMetadata,
) -> Result<&'s AssociationMetadata, ConfigurationError> {
    let mut tried: Vec<String> = Vec::new();
    let candidates = association
        .source
        .map(str::to_string)
        .into_iter()
        .chain([association.name.to_string(), singularize(association.name)]);
    for candidate in candidates {
        if tried.contains(&candidate) {
            continue;
        }
        if let Some(source) = through_entity.reflect_on_association(&candidate) {
            return match source.kind {
                AssociationKind::HasAndBelongsToMany | AssociationKind::HasManyThrough => {
                    Err(ConfigurationError::invalid_configuration(
                        format!("{}.{}", association.owner, association.name),
                        format!("source association '{}' must be direct", source.name),
                    ))
                }
                _ => Ok(source),
            };
        }
        tried.push(candidate);
    }
    Err(ConfigurationError::SourceAssociationNotFound {
        through_entity: through_entity.name.to_string(),
        tried,
    })
}
