//! Default-include declarations, one list per entity. Built once at startup
//! and shared read-only between finder calls.

use std::collections::HashMap;

use heck::ToPascalCase;

use crate::finder::IncludeSpec;
use crate::schema::{EntityMetadata, SchemaRegistry};
use crate::types::ConfigurationError;

#[derive(Debug, Clone, Default)]
pub struct DefaultIncludeRegistry {
    declarations: HashMap<String, Vec<IncludeSpec>>,
}

impl DefaultIncludeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the associations `entity` eager-loads when a call names none.
    /// A later declaration for the same entity replaces the earlier one.
    pub fn include_by_default<I, S>(mut self, entity: impl Into<String>, includes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<IncludeSpec>,
    {
        self.declarations
            .insert(entity.into(), includes.into_iter().map(Into::into).collect());
        self
    }

    /// Parses `{"Post": ["comments", {"name": "author", "include": ["profile"]}]}`
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let declarations: HashMap<String, Vec<IncludeSpec>> = serde_json::from_str(json)
            .map_err(|e| {
                ConfigurationError::invalid_configuration("default includes", e.to_string())
            })?;
        Ok(Self { declarations })
    }

    /// Namespace-aware lookup of an entity's declared defaults
    pub fn defaults_for(&self, entity_name: &str) -> Option<&[IncludeSpec]> {
        // Try exact match first
        if let Some(includes) = self.declarations.get(entity_name) {
            return Some(includes.as_slice());
        }
        // "blog::Post" -> "Post"
        if let Some(colon_pos) = entity_name.rfind("::") {
            if let Some(includes) = self.declarations.get(&entity_name[colon_pos + 2..]) {
                return Some(includes.as_slice());
            }
        }
        self.declarations
            .get(&entity_name.to_pascal_case())
            .map(Vec::as_slice)
    }

    /// Checks every declared association, nested ones included, against the
    /// schema
    pub fn validate(&self, schema: &SchemaRegistry) -> Result<(), ConfigurationError> {
        for (entity_name, includes) in &self.declarations {
            let entity = schema.entity(entity_name)?;
            validate_includes(schema, entity, includes)?;
        }
        Ok(())
    }
}

fn validate_includes(
    schema: &SchemaRegistry,
    entity: &EntityMetadata,
    includes: &[IncludeSpec],
) -> Result<(), ConfigurationError> {
    for spec in includes {
        let association = entity
            .reflect_on_association(spec.name())
            .ok_or_else(|| ConfigurationError::association_not_found(entity.name, spec.name()))?;
        if let IncludeSpec::Nested { include, .. } = spec {
            let target = schema.target_of(association)?;
            validate_includes(schema, target, include)?;
        }
    }
    Ok(())
}

/// Builds a `Vec<IncludeSpec>` from association names, with `name => [...]`
/// for nested includes.
///
/// ```
/// use include_by_default::{includes, IncludeSpec};
///
/// let specs = includes![comments, author => [profile]];
/// assert_eq!(specs[0], IncludeSpec::association("comments"));
/// assert_eq!(
///     specs[1],
///     IncludeSpec::nested("author", vec![IncludeSpec::association("profile")])
/// );
/// ```
#[macro_export]
macro_rules! includes {
    () => {
        ::std::vec::Vec::<$crate::IncludeSpec>::new()
    };
    ($($name:ident $(=> [$($nested:tt)*])?),+ $(,)?) => {
        ::std::vec![$($crate::__include_spec!($name $(=> [$($nested)*])?)),+]
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __include_spec {
    ($name:ident) => {
        $crate::IncludeSpec::association(stringify!($name))
    };
    ($name:ident => [$($nested:tt)*]) => {
        $crate::IncludeSpec::nested(stringify!($name), $crate::includes![$($nested)*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AssociationMetadata;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new()
            .register(
                EntityMetadata::new("Post", "posts")
                    .association(AssociationMetadata::has_many("comments", "Comment"))
                    .association(AssociationMetadata::belongs_to("author", "Author")),
            )
            .register(EntityMetadata::new("Comment", "comments"))
            .register(
                EntityMetadata::new("Author", "authors")
                    .association(AssociationMetadata::has_one("profile", "Profile")),
            )
            .register(EntityMetadata::new("Profile", "profiles"))
    }

    #[test]
    fn test_lookup_is_namespace_aware() {
        let registry = DefaultIncludeRegistry::new().include_by_default("Post", ["comments"]);
        let expected = [IncludeSpec::association("comments")];
        assert_eq!(registry.defaults_for("Post"), Some(&expected[..]));
        assert_eq!(registry.defaults_for("blog::Post"), Some(&expected[..]));
        assert_eq!(registry.defaults_for("post"), Some(&expected[..]));
        assert_eq!(registry.defaults_for("Comment"), None);
    }

    #[test]
    fn test_redeclaring_replaces() {
        let registry = DefaultIncludeRegistry::new()
            .include_by_default("Post", ["comments"])
            .include_by_default("Post", crate::includes![author => [profile]]);
        assert_eq!(
            registry.defaults_for("Post").unwrap(),
            &crate::includes![author => [profile]][..]
        );
    }

    #[test]
    fn test_from_json_and_validate() {
        let registry = DefaultIncludeRegistry::from_json_str(
            r#"{"Post": ["comments", {"name": "author", "include": ["profile"]}]}"#,
        )
        .unwrap();
        assert!(registry.validate(&schema()).is_ok());

        let broken = DefaultIncludeRegistry::new()
            .include_by_default("Post", crate::includes![author => [avatar]]);
        assert_eq!(
            broken.validate(&schema()).unwrap_err(),
            ConfigurationError::association_not_found("Author", "avatar")
        );
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = DefaultIncludeRegistry::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidConfiguration { .. }));
    }
}
