use crate::backend::BackendError;
use crate::reindex::ReindexError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Search backend errors
    #[error("Search backend error: {0}")]
    Backend(#[from] BackendError),

    /// Reindex errors
    #[error("Reindex failed: {0}")]
    Reindex(#[from] ReindexError),

    /// More than one physical index exists for an index type
    #[error("Index type has more than one identifier: {}", .0.join(", "))]
    AmbiguousIdentifier(Vec<String>),

    /// An index carries the name an alias needs
    #[error("An index named {0} exists where the alias should be; rerun with --rebuild to delete it")]
    AliasNameTaken(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Backend(_) => "BACKEND_ERROR",
            AppError::Reindex(_) => "REINDEX_ERROR",
            AppError::AmbiguousIdentifier(_) => "AMBIGUOUS_IDENTIFIER",
            AppError::AliasNameTaken(_) => "ALIAS_NAME_TAKEN",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from serde_yaml::Error
impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
