use thiserror::Error;

/// Crate-wide result alias
pub type IncludeResult<T> = std::result::Result<T, FindError>;

/// Mismatches between declared defaults and the schema metadata.
///
/// These are terminal: rewriting SQL cannot fix them, so they are never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("ConfigurationError::EntityNotFound: entity='{entity}'")]
    EntityNotFound { entity: String },

    #[error("ConfigurationError::AssociationNotFound: entity='{entity}' association='{association}'")]
    AssociationNotFound { entity: String, association: String },

    #[error(
        "ConfigurationError::ThroughAssociationNotFound: entity='{entity}' association='{association}' through='{through}'"
    )]
    ThroughAssociationNotFound {
        entity: String,
        association: String,
        through: String,
    },

    #[error(
        "ConfigurationError::SourceAssociationNotFound: through_entity='{through_entity}' tried={tried:?}"
    )]
    SourceAssociationNotFound {
        through_entity: String,
        tried: Vec<String>,
    },

    #[error("ConfigurationError::InvalidConfiguration: component='{component}' message='{message}'")]
    InvalidConfiguration { component: String, message: String },
}

impl ConfigurationError {
    pub fn entity_not_found(entity: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity: entity.into(),
        }
    }

    pub fn association_not_found(entity: impl Into<String>, association: impl Into<String>) -> Self {
        Self::AssociationNotFound {
            entity: entity.into(),
            association: association.into(),
        }
    }

    pub fn invalid_configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by a finder call
#[derive(Debug, Error)]
pub enum FindError {
    /// The data store rejected the statement (duplicate alias, ambiguous
    /// column). The only kind the default-include decorator retries.
    #[error("FindError::StatementInvalid: {message}")]
    StatementInvalid { message: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("FindError::Database: {0}")]
    Database(sea_orm::DbErr),

    #[error("FindError::Hydration: {message}")]
    Hydration { message: String },
}

impl FindError {
    pub fn statement_invalid(message: impl Into<String>) -> Self {
        Self::StatementInvalid {
            message: message.into(),
        }
    }

    pub fn hydration(message: impl Into<String>) -> Self {
        Self::Hydration {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StatementInvalid { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<sea_orm::DbErr> for FindError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::Query(inner) | sea_orm::DbErr::Exec(inner) => Self::StatementInvalid {
                message: inner.to_string(),
            },
            other => Self::Database(other),
        }
    }
}

impl From<FindError> for sea_orm::DbErr {
    fn from(err: FindError) -> Self {
        match err {
            FindError::Database(inner) => inner,
            other => sea_orm::DbErr::Custom(other.to_string()),
        }
    }
}

impl From<ConfigurationError> for sea_orm::DbErr {
    fn from(err: ConfigurationError) -> Self {
        sea_orm::DbErr::Custom(err.to_string())
    }
}
