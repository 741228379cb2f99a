//! Runtime configuration for the default-include layer.

use serde::{Deserialize, Serialize};

use crate::types::ConfigurationError;

/// Naming scheme and retry behaviour, built once at startup and shared
/// read-only between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncludeByDefaultConfig {
    /// Prefix of the alias given to a synthesized join (or through) table
    pub join_table_alias_prefix: String,
    /// Prefix of the alias given to a synthesized target table
    pub assoc_table_alias_prefix: String,
    /// Prefix used when a colliding alias in a base fragment is renamed
    pub renamed_alias_prefix: String,
    /// Rewrite includes into joins and retry once on a statement error
    pub retry_on_statement_error: bool,
}

impl Default for IncludeByDefaultConfig {
    fn default() -> Self {
        Self {
            join_table_alias_prefix: "ibd_join_table".to_string(),
            assoc_table_alias_prefix: "ibd_assoc_table".to_string(),
            renamed_alias_prefix: "renamed_join_table".to_string(),
            retry_on_statement_error: true,
        }
    }
}

impl IncludeByDefaultConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ConfigurationError::invalid_configuration("IncludeByDefaultConfig", e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let prefixes = [
            ("join_table_alias_prefix", &self.join_table_alias_prefix),
            ("assoc_table_alias_prefix", &self.assoc_table_alias_prefix),
            ("renamed_alias_prefix", &self.renamed_alias_prefix),
        ];
        for (field, value) in prefixes {
            if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
                return Err(ConfigurationError::invalid_configuration(
                    "IncludeByDefaultConfig",
                    format!("{} must be a non-empty identifier", field),
                ));
            }
        }
        if self.join_table_alias_prefix == self.assoc_table_alias_prefix {
            return Err(ConfigurationError::invalid_configuration(
                "IncludeByDefaultConfig",
                "join and target alias prefixes must differ",
            ));
        }
        Ok(())
    }

    pub fn join_table_alias(&self, index: usize) -> String {
        format!("{}_{}", self.join_table_alias_prefix, index)
    }

    pub fn assoc_table_alias(&self, index: usize) -> String {
        format!("{}_{}", self.assoc_table_alias_prefix, index)
    }

    pub fn renamed_alias(&self, index: usize) -> String {
        format!("{}_{}", self.renamed_alias_prefix, index)
    }
}
