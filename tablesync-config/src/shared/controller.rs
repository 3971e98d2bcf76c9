use serde::{Deserialize, Serialize};

use crate::shared::{OrchestratorConfig, ValidationError};

/// Top-level configuration for the controller binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControllerConfig {
    /// Orchestration engine settings.
    pub sync: OrchestratorConfig,
    /// Path to the declarative schema file the table catalog is parsed from.
    pub schema_path: String,
    /// Whether runs started by this controller report differences without
    /// mutating the target.
    #[serde(default)]
    pub dry_run: bool,
}

impl ControllerConfig {
    /// Validates the [`ControllerConfig`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_path.is_empty() {
            return Err(ValidationError::MissingSchemaPath);
        }

        if self.sync.tool.path.is_empty() {
            return Err(ValidationError::MissingToolPath);
        }

        Ok(())
    }
}
