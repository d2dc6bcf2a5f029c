use thiserror::Error;

/// Top-level error type for the Aster support assistant.
///
/// Covers the failures that can happen before the engine starts taking
/// turns: reading configuration, loading knowledge data, and (de)serializing
/// either. Per-turn conditions never surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AsterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Knowledge error: {0}")]
    Knowledge(String),
}

impl From<toml::de::Error> for AsterError {
    fn from(err: toml::de::Error) -> Self {
        AsterError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AsterError {
    fn from(err: toml::ser::Error) -> Self {
        AsterError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AsterError {
    fn from(err: serde_json::Error) -> Self {
        AsterError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Aster operations.
pub type Result<T> = std::result::Result<T, AsterError>;
