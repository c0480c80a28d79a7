use thiserror::Error;

/// Top-level error type for the broker workspace.
///
/// Subsystem crates define their own error enums and convert into or out of
/// `BrokerError` at crate boundaries so that `?` works across them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BrokerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for BrokerError {
    fn from(err: toml::de::Error) -> Self {
        BrokerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BrokerError {
    fn from(err: toml::ser::Error) -> Self {
        BrokerError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
