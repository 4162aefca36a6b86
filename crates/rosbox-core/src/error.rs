//! Error types for rosbox-core

use rosbox_provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] rosbox_config::ConfigError),

    #[error("Unknown image '{name}'. Known images: {}", known.join(", "))]
    UnknownImage { name: String, known: Vec<String> },

    #[error("Image '{tag}' has not been built yet. Run `rosbox build {name}` first")]
    ImageNotBuilt { name: String, tag: String },

    #[error("Invalid box name '{0}': use letters, digits, '_', '.' or '-', starting with a letter or digit")]
    InvalidName(String),

    #[error("Box already exists: {0}")]
    NameAlreadyExists(String),

    #[error("Box not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Container backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProviderError> for CoreError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::ContainerNotFound(name) => Self::NotFound(name),
            ProviderError::Unsupported(msg) => Self::UnsupportedOperation(msg),
            ProviderError::ConnectionError(msg) => Self::BackendUnavailable(msg),
            ProviderError::Config(e) => Self::Config(e),
            other => Self::OperationFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
