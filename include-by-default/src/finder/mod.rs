//! Finder capability and the default-include decorator around it.

pub mod options;
pub mod sea_orm_finder;

pub use options::{FindOptions, FindScope, IncludeSpec};
pub use sea_orm_finder::SeaOrmFinder;

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::config::IncludeByDefaultConfig;
use crate::eager_load::{EagerLoadEntry, EagerLoadPlan, Record};
use crate::join_fragments::{extend_sql_avoiding_table_naming_clashes, JoinFragmentSynthesizer};
use crate::registry::DefaultIncludeRegistry;
use crate::schema::SchemaRegistry;
use crate::types::{ConfigurationError, FindError, IncludeResult};

/// Per-call scratch state. Created fresh for every finder call and never
/// shared between calls.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub plan: EagerLoadPlan,
    statements: Vec<String>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_statement(&mut self, sql: impl Into<String>) {
        self.statements.push(sql.into());
    }

    /// Every statement sent to the database during this call, in order
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn last_statement(&self) -> Option<&str> {
        self.statements.last().map(String::as_str)
    }
}

/// The "find every matching record" operation of the ORM
#[async_trait]
pub trait Finder: Send + Sync {
    async fn find_every(
        &self,
        entity: &str,
        options: &FindOptions,
        context: &mut QueryContext,
    ) -> IncludeResult<Vec<Record>>;

    /// Runs `find_every` with a fresh context
    async fn find_all(&self, entity: &str, options: &FindOptions) -> IncludeResult<Vec<Record>> {
        let mut context = QueryContext::new();
        self.find_every(entity, options, &mut context).await
    }
}

/// Moves many-to-many and has-many-through includes into synthesized
/// `joins`, recording each one on the context's plan so its rows can still
/// be hydrated.
///
/// Nested includes and direct associations stay in `include`. The caller's
/// own `joins` keep their aliases; synthesized aliases are renamed on
/// collision and the plan follows the rename.
pub fn convert_problematic_includes_to_joins(
    schema: &SchemaRegistry,
    config: &IncludeByDefaultConfig,
    entity: &str,
    options: &mut FindOptions,
    context: &mut QueryContext,
) -> Result<(), ConfigurationError> {
    let owner = schema.entity(entity)?;
    let synthesizer = JoinFragmentSynthesizer::new(schema, config);

    let includes = options.merged_includes();
    if let Some(scope) = options.scope.as_mut() {
        scope.include = None;
    }

    let mut kept = Vec::new();
    let mut fragments = Vec::new();
    let mut index = 0;
    for spec in includes {
        if spec.is_nested() {
            kept.push(spec);
            continue;
        }
        index += 1;
        let association = owner
            .reflect_on_association(spec.name())
            .ok_or_else(|| ConfigurationError::association_not_found(owner.name, spec.name()))?;
        match synthesizer.synthesize(owner, association, index)? {
            Some(fragment) => {
                debug!(
                    "converted include {}.{} to join as {}",
                    owner.name, fragment.association, fragment.table_alias
                );
                context.plan.push(EagerLoadEntry::from(&fragment));
                fragments.push(fragment.sql);
            }
            None => kept.push(spec),
        }
    }

    if !fragments.is_empty() {
        let base = fragments.join(" ");
        let resolved = extend_sql_avoiding_table_naming_clashes(
            Some(base.as_str()),
            options.joins.as_deref(),
            &config.renamed_alias_prefix,
        );
        for (old, new) in &resolved.renames {
            context.plan.rename_table_alias(old, new);
        }
        options.joins = Some(resolved.sql).filter(|sql| !sql.is_empty());
    }
    options.include = if kept.is_empty() { None } else { Some(kept) };
    Ok(())
}

/// Progress of one decorated call
enum Attempt {
    Initial,
    Rewritten,
    Failed(FindError),
}

/// Wraps a [`Finder`] so every call eager-loads the entity's declared
/// defaults, and retries once with synthesized joins when the statement is
/// rejected.
pub struct DefaultIncludeFinder<F> {
    inner: F,
    schema: Arc<SchemaRegistry>,
    defaults: Arc<DefaultIncludeRegistry>,
    config: Arc<IncludeByDefaultConfig>,
}

impl<F: Finder> DefaultIncludeFinder<F> {
    pub fn new(
        inner: F,
        schema: Arc<SchemaRegistry>,
        defaults: Arc<DefaultIncludeRegistry>,
        config: Arc<IncludeByDefaultConfig>,
    ) -> Self {
        Self {
            inner,
            schema,
            defaults,
            config,
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Fills an unset `include` from the entity's declaration. An explicit
    /// include, even an empty one, is left alone.
    pub fn apply_defaults(&self, entity: &str, options: &mut FindOptions) -> bool {
        if options.include.is_some() {
            return false;
        }
        match self.defaults.defaults_for(entity) {
            Some(defaults) if !defaults.is_empty() => {
                debug!("applying default includes for {}: {:?}", entity, defaults);
                options.include = Some(defaults.to_vec());
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl<F: Finder> Finder for DefaultIncludeFinder<F> {
    async fn find_every(
        &self,
        entity: &str,
        options: &FindOptions,
        context: &mut QueryContext,
    ) -> IncludeResult<Vec<Record>> {
        let mut options = options.clone();
        self.apply_defaults(entity, &mut options);

        let mut attempt = Attempt::Initial;
        loop {
            attempt = match attempt {
                Attempt::Initial => match self.inner.find_every(entity, &options, context).await {
                    Ok(records) => return Ok(records),
                    Err(err) if err.is_recoverable() && self.config.retry_on_statement_error => {
                        warn!("find on {} failed, retrying with synthesized joins: {}", entity, err);
                        context.plan.clear();
                        convert_problematic_includes_to_joins(
                            &self.schema,
                            &self.config,
                            entity,
                            &mut options,
                            context,
                        )?;
                        Attempt::Rewritten
                    }
                    Err(err) => Attempt::Failed(err),
                },
                Attempt::Rewritten => match self.inner.find_every(entity, &options, context).await {
                    Ok(records) => return Ok(records),
                    Err(err) => Attempt::Failed(err),
                },
                Attempt::Failed(err) => return Err(err),
            };
        }
    }
}
