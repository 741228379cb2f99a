//! Native eager-load planner.
//!
//! Turns an include list into `LEFT OUTER JOIN` text, a `t<N>_r<M>` column
//! list and, once rows are back, a graph of [`Record`]s. Every joined table
//! goes in under its raw table name, so two includes that touch the same
//! table produce a statement the database rejects. The default-include
//! finder recovers from that by moving such includes into synthesized joins.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};
use serde_json::{Map, Value};

use super::plan::EagerLoadPlan;
use super::projection::{column_alias, column_alias_table_index};
use super::record::{Loaded, Record, Row};
use crate::finder::IncludeSpec;
use crate::join_fragments::{direct_join_condition, synthesizer::resolve_through_chain};
use crate::schema::{AssociationMetadata, Cardinality, EntityMetadata, SchemaRegistry};
use crate::types::{ConfigurationError, FindError};

/// One eagerly loaded association in the plan
#[derive(Debug, Clone)]
pub struct JoinNode<'s> {
    pub association: &'s AssociationMetadata,
    /// Slot of the parent: 0 is the base entity, `k` is `nodes[k - 1]`
    pub parent: usize,
    pub entity: &'s EntityMetadata,
    pub table_alias: String,
    pub table_index: usize,
    /// `None` for associations joined outside the planner
    pub join_sql: Option<String>,
}

impl JoinNode<'_> {
    pub fn is_native(&self) -> bool {
        self.join_sql.is_some()
    }

    fn column(&self, index: usize) -> String {
        column_alias(self.table_index, index)
    }
}

#[derive(Debug, Clone)]
pub struct JoinDependency<'s> {
    schema: &'s SchemaRegistry,
    base: &'s EntityMetadata,
    nodes: Vec<JoinNode<'s>>,
}

impl<'s> JoinDependency<'s> {
    pub fn new(
        schema: &'s SchemaRegistry,
        entity: &str,
        includes: &[IncludeSpec],
    ) -> Result<Self, ConfigurationError> {
        let base = schema.entity(entity)?;
        let mut dependency = Self {
            schema,
            base,
            nodes: Vec::new(),
        };
        dependency.plan(0, base, base.table_name, includes)?;
        Ok(dependency)
    }

    pub fn base(&self) -> &'s EntityMetadata {
        self.base
    }

    pub fn nodes(&self) -> &[JoinNode<'s>] {
        &self.nodes
    }

    fn plan(
        &mut self,
        parent: usize,
        parent_entity: &'s EntityMetadata,
        parent_alias: &str,
        includes: &[IncludeSpec],
    ) -> Result<(), ConfigurationError> {
        for spec in includes {
            let association = parent_entity
                .reflect_on_association(spec.name())
                .ok_or_else(|| {
                    ConfigurationError::association_not_found(parent_entity.name, spec.name())
                })?;

            let (entity, join_sql) = match association.kind.cardinality() {
                Cardinality::Direct => {
                    let target = self.schema.target_of(association)?;
                    let condition = direct_join_condition(
                        association,
                        parent_entity,
                        parent_alias,
                        target,
                        target.table_name,
                    );
                    let sql = format!("LEFT OUTER JOIN {} ON {}", target.table_name, condition);
                    (target, sql)
                }
                Cardinality::ManyToMany => {
                    let target = self.schema.target_of(association)?;
                    let join_table = association.resolved_join_table(parent_entity, target);
                    let sql = format!(
                        "LEFT OUTER JOIN {jt} ON {jt}.{fk} = {parent}.{parent_pk} \
                         LEFT OUTER JOIN {target} ON {target}.{target_pk} = {jt}.{afk}",
                        jt = join_table,
                        fk = association.resolved_foreign_key(parent_entity),
                        parent = parent_alias,
                        parent_pk = parent_entity.primary_key,
                        target = target.table_name,
                        target_pk = target.primary_key,
                        afk = association.resolved_association_foreign_key(target),
                    );
                    (target, sql)
                }
                Cardinality::HasManyThrough => {
                    let chain = resolve_through_chain(self.schema, parent_entity, association)?;
                    let through_table = chain.through_entity.table_name;
                    let target_table = chain.source_entity.table_name;
                    let sql = format!(
                        "LEFT OUTER JOIN {} ON {} LEFT OUTER JOIN {} ON {}",
                        through_table,
                        direct_join_condition(
                            chain.through_assoc,
                            parent_entity,
                            parent_alias,
                            chain.through_entity,
                            through_table,
                        ),
                        target_table,
                        direct_join_condition(
                            chain.source_assoc,
                            chain.through_entity,
                            through_table,
                            chain.source_entity,
                            target_table,
                        ),
                    );
                    (chain.source_entity, sql)
                }
            };

            self.nodes.push(JoinNode {
                association,
                parent,
                entity,
                table_alias: entity.table_name.to_string(),
                table_index: self.nodes.len() + 1,
                join_sql: Some(join_sql),
            });
            let slot = self.nodes.len();

            if let IncludeSpec::Nested { include, .. } = spec {
                self.plan(slot, entity, entity.table_name, include)?;
            }
        }
        Ok(())
    }

    /// SELECT list for the base table and every natively joined table
    pub fn column_aliases(&self, quote: &dyn Fn(&str) -> String) -> String {
        let base = self.base.columns.iter().enumerate().map(|(j, column)| {
            format!("{}.{} AS {}", self.base.table_name, quote(column), column_alias(0, j))
        });
        let joined = self.nodes.iter().filter(|n| n.is_native()).flat_map(|node| {
            node.entity.columns.iter().enumerate().map(move |(j, column)| {
                format!("{}.{} AS {}", node.table_alias, quote(column), node.column(j))
            })
        });
        base.chain(joined).collect::<Vec<_>>().join(", ")
    }

    pub fn join_sql(&self) -> String {
        self.nodes
            .iter()
            .filter_map(|node| node.join_sql.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether a native join can return several rows per base record
    pub fn has_collection_joins(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| node.is_native() && node.association.kind.is_collection())
    }

    /// Registers associations joined outside the planner so their rows get
    /// hydrated along with the native ones.
    ///
    /// Entries whose first projected column is missing from the first row are
    /// skipped. Returns how many were registered.
    pub fn register_converted_associations(
        &mut self,
        rows: &[Row],
        plan: &EagerLoadPlan,
    ) -> Result<usize, ConfigurationError> {
        let Some(first_row) = rows.first() else {
            return Ok(0);
        };

        let mut registered = 0;
        for entry in plan.entries() {
            let Some(first_column) = entry.first_column.as_deref() else {
                continue;
            };
            if !first_row.contains_key(first_column) {
                debug!(
                    "skipping {}.{}: column {} not in result",
                    self.base.name, entry.association, first_column
                );
                continue;
            }
            let Some(table_index) = column_alias_table_index(first_column) else {
                continue;
            };
            let association = self
                .base
                .reflect_on_association(&entry.association)
                .ok_or_else(|| {
                    ConfigurationError::association_not_found(self.base.name, &entry.association)
                })?;
            let entity = self.schema.entity(&entry.class_name)?;

            self.nodes.push(JoinNode {
                association,
                parent: 0,
                entity,
                table_alias: entry.table_alias.clone(),
                table_index,
                join_sql: None,
            });
            registered += 1;
        }
        Ok(registered)
    }

    /// Builds base records, in first-seen order, with every planned
    /// association attached. Rows repeated by collection joins are merged.
    pub fn instantiate(&self, rows: &[Row]) -> Result<Vec<Record>, FindError> {
        let slots = self.nodes.len() + 1;
        let mut arena: Vec<Vec<Map<String, Value>>> = vec![Vec::new(); slots];
        let mut seen: Vec<HashMap<String, usize>> = vec![HashMap::new(); slots];
        // links[k][parent] = children of node k under that parent record
        let mut links: Vec<HashMap<usize, Vec<usize>>> = vec![HashMap::new(); slots];
        let mut linked: HashSet<(usize, usize, usize)> = HashSet::new();
        let mut roots: Vec<usize> = Vec::new();

        let base_pk = self.base.column_index(self.base.primary_key).ok_or_else(|| {
            FindError::hydration(format!(
                "primary key '{}' is not a column of {}",
                self.base.primary_key, self.base.name
            ))
        })?;

        for row in rows {
            let mut current: Vec<Option<usize>> = vec![None; slots];

            let key = match row.get(&column_alias(0, base_pk)) {
                Some(value) if !value.is_null() => value.to_string(),
                _ => {
                    return Err(FindError::hydration(format!(
                        "row without primary key for {}",
                        self.base.name
                    )))
                }
            };
            let root = match seen[0].get(&key) {
                Some(&index) => index,
                None => {
                    let index = arena[0].len();
                    arena[0].push(extract(row, self.base, 0));
                    seen[0].insert(key, index);
                    roots.push(index);
                    index
                }
            };
            current[0] = Some(root);

            for (k, node) in self.nodes.iter().enumerate() {
                let slot = k + 1;
                let Some(parent_index) = current[node.parent] else {
                    continue;
                };
                let Some(pk) = node.entity.column_index(node.entity.primary_key) else {
                    continue;
                };
                let key = match row.get(&node.column(pk)) {
                    Some(value) if !value.is_null() => value.to_string(),
                    _ => continue,
                };
                let index = match seen[slot].get(&key) {
                    Some(&index) => index,
                    None => {
                        let index = arena[slot].len();
                        arena[slot].push(extract(row, node.entity, node.table_index));
                        seen[slot].insert(key, index);
                        index
                    }
                };
                current[slot] = Some(index);
                if linked.insert((slot, parent_index, index)) {
                    links[slot].entry(parent_index).or_default().push(index);
                }
            }
        }

        trace!(
            "instantiated {} {} record(s) from {} row(s)",
            roots.len(),
            self.base.name,
            rows.len()
        );
        let graph = Graph {
            dependency: self,
            arena: &arena,
            links: &links,
        };
        Ok(roots.into_iter().map(|index| graph.build(0, index)).collect())
    }
}

struct Graph<'a, 's> {
    dependency: &'a JoinDependency<'s>,
    arena: &'a [Vec<Map<String, Value>>],
    links: &'a [HashMap<usize, Vec<usize>>],
}

impl Graph<'_, '_> {
    fn build(&self, slot: usize, index: usize) -> Record {
        let entity = match slot {
            0 => self.dependency.base,
            k => self.dependency.nodes[k - 1].entity,
        };
        let mut record = Record::new(entity.name, self.arena[slot][index].clone());

        for (k, node) in self.dependency.nodes.iter().enumerate() {
            if node.parent != slot {
                continue;
            }
            let child_slot = k + 1;
            let mut children = self.links[child_slot]
                .get(&index)
                .map(|children| {
                    children
                        .iter()
                        .map(|&child| self.build(child_slot, child))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let loaded = if node.association.kind.is_collection() {
                Loaded::Many(children)
            } else if children.is_empty() {
                Loaded::One(None)
            } else {
                Loaded::One(Some(Box::new(children.swap_remove(0))))
            };
            record.set_association(node.association.name, loaded);
        }
        record
    }
}

fn extract(row: &Row, entity: &EntityMetadata, table_index: usize) -> Map<String, Value> {
    entity
        .columns
        .iter()
        .enumerate()
        .map(|(j, column)| {
            let value = row
                .get(&column_alias(table_index, j))
                .cloned()
                .unwrap_or(Value::Null);
            (column.to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eager_load::plan::EagerLoadEntry;
    use crate::schema::AssociationMetadata;
    use serde_json::json;

    fn quote(name: &str) -> String {
        name.to_string()
    }

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new()
            .register(
                EntityMetadata::new("Post", "posts")
                    .columns(["id", "title", "author_id"])
                    .association(AssociationMetadata::belongs_to("author", "Author"))
                    .association(AssociationMetadata::has_many("taggings", "Tagging"))
                    .association(AssociationMetadata::has_many_through("tags", "taggings"))
                    .association(
                        AssociationMetadata::has_and_belongs_to_many("comments", "Comment")
                            .join_table("posts_comments"),
                    ),
            )
            .register(
                EntityMetadata::new("Author", "authors")
                    .columns(["id", "name"])
                    .association(AssociationMetadata::has_one("profile", "Profile")),
            )
            .register(EntityMetadata::new("Profile", "profiles").columns(["id", "author_id", "bio"]))
            .register(
                EntityMetadata::new("Tagging", "taggings")
                    .columns(["id", "post_id", "tag_id"])
                    .association(AssociationMetadata::belongs_to("tag", "Tag")),
            )
            .register(EntityMetadata::new("Tag", "tags").columns(["id", "name"]))
            .register(EntityMetadata::new("Comment", "comments").columns(["id", "body"]))
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_plans_nested_includes_in_order() {
        let schema = schema();
        let includes = crate::includes![author => [profile], comments];
        let dependency = JoinDependency::new(&schema, "Post", &includes).unwrap();

        assert_eq!(
            dependency.join_sql(),
            "LEFT OUTER JOIN authors ON authors.id = posts.author_id \
             LEFT OUTER JOIN profiles ON profiles.author_id = authors.id \
             LEFT OUTER JOIN posts_comments ON posts_comments.post_id = posts.id \
             LEFT OUTER JOIN comments ON comments.id = posts_comments.comment_id"
        );
        assert_eq!(
            dependency.column_aliases(&quote),
            "posts.id AS t0_r0, posts.title AS t0_r1, posts.author_id AS t0_r2, \
             authors.id AS t1_r0, authors.name AS t1_r1, \
             profiles.id AS t2_r0, profiles.author_id AS t2_r1, profiles.bio AS t2_r2, \
             comments.id AS t3_r0, comments.body AS t3_r1"
        );
        assert!(dependency.has_collection_joins());
    }

    #[test]
    fn test_through_joins_raw_tables() {
        let schema = schema();
        let dependency =
            JoinDependency::new(&schema, "Post", &crate::includes![taggings, tags]).unwrap();
        // taggings is joined twice under the same name
        assert_eq!(dependency.join_sql().matches("JOIN taggings ").count(), 2);
    }

    #[test]
    fn test_unknown_include_is_configuration_error() {
        let err = JoinDependency::new(&schema(), "Post", &crate::includes![likes]).unwrap_err();
        assert_eq!(err, ConfigurationError::association_not_found("Post", "likes"));
    }

    #[test]
    fn test_instantiate_groups_and_dedups() {
        let schema = schema();
        let dependency =
            JoinDependency::new(&schema, "Post", &crate::includes![author, comments]).unwrap();
        let rows = vec![
            row(&[
                ("t0_r0", json!(1)),
                ("t0_r1", json!("first")),
                ("t0_r2", json!(5)),
                ("t1_r0", json!(5)),
                ("t1_r1", json!("ann")),
                ("t2_r0", json!(10)),
                ("t2_r1", json!("hi")),
            ]),
            row(&[
                ("t0_r0", json!(1)),
                ("t0_r1", json!("first")),
                ("t0_r2", json!(5)),
                ("t1_r0", json!(5)),
                ("t1_r1", json!("ann")),
                ("t2_r0", json!(11)),
                ("t2_r1", json!("again")),
            ]),
            row(&[
                ("t0_r0", json!(2)),
                ("t0_r1", json!("second")),
                ("t0_r2", Value::Null),
                ("t1_r0", Value::Null),
                ("t1_r1", Value::Null),
                ("t2_r0", Value::Null),
                ("t2_r1", Value::Null),
            ]),
        ];

        let posts = dependency.instantiate(&rows).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].one("author").unwrap().get("name"), Some(&json!("ann")));
        assert_eq!(posts[0].many("comments").len(), 2);
        assert!(posts[1].is_loaded("comments"));
        assert!(posts[1].many("comments").is_empty());
        assert!(posts[1].is_loaded("author"));
        assert!(posts[1].one("author").is_none());
    }

    #[test]
    fn test_converted_association_is_hydrated() {
        let schema = schema();
        let mut dependency = JoinDependency::new(&schema, "Post", &[]).unwrap();
        let mut plan = EagerLoadPlan::new();
        plan.push(EagerLoadEntry {
            class_name: "Tag".to_string(),
            table_alias: "ibd_assoc_table_1".to_string(),
            association: "tags".to_string(),
            first_column: Some("t1_r0".to_string()),
        });
        let rows = vec![
            row(&[("t0_r0", json!(1)), ("t1_r0", json!(3)), ("t1_r1", json!("rust"))]),
            row(&[("t0_r0", json!(1)), ("t1_r0", json!(4)), ("t1_r1", json!("sql"))]),
        ];

        assert_eq!(dependency.register_converted_associations(&rows, &plan).unwrap(), 1);
        let posts = dependency.instantiate(&rows).unwrap();
        let names: Vec<_> = posts[0].many("tags").iter().map(|t| t.get("name").cloned()).collect();
        assert_eq!(names, vec![Some(json!("rust")), Some(json!("sql"))]);
    }

    #[test]
    fn test_converted_association_without_columns_is_skipped() {
        let schema = schema();
        let mut dependency = JoinDependency::new(&schema, "Post", &[]).unwrap();
        let mut plan = EagerLoadPlan::new();
        plan.push(EagerLoadEntry {
            class_name: "Tag".to_string(),
            table_alias: "ibd_assoc_table_1".to_string(),
            association: "tags".to_string(),
            first_column: Some("t1_r0".to_string()),
        });

        assert_eq!(dependency.register_converted_associations(&[], &plan).unwrap(), 0);
        let rows = vec![row(&[("t0_r0", json!(1))])];
        assert_eq!(dependency.register_converted_associations(&rows, &plan).unwrap(), 0);
        assert!(!dependency.instantiate(&rows).unwrap()[0].is_loaded("tags"));
    }
}
