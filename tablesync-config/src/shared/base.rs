use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No schema file configured, so the table catalog cannot be built.
    #[error("Invalid controller config: `schema_path` must not be empty")]
    MissingSchemaPath,

    /// The sync tool binary path is empty.
    #[error("Invalid tool config: `path` must not be empty")]
    MissingToolPath,

    /// General configuration validation error.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
