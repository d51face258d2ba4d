// joinbase-core/src/error.rs
// Error taxonomy shared by the loader, the query compiler and the store gateway

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoinBaseError {
    /// The JSON source could not be opened because it does not exist.
    /// Raised before any batch is committed.
    #[error("JSON source not found: {path}")]
    SourceNotFound { path: String },

    /// Syntax or shape error in the JSON stream. Batches committed before the
    /// error stay committed.
    #[error("Malformed JSON in {source_name}: {message}")]
    MalformedInput {
        source_name: String,
        message: String,
    },

    /// Any other read failure while streaming the JSON source.
    #[error("I/O failure while reading {source_name}: {message}")]
    IoFailure {
        source_name: String,
        message: String,
    },

    /// The store rejected a batch insert. The batch is lost, earlier batches stay.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// The store rejected a compiled pipeline.
    #[error("Query failure: {0}")]
    QueryFailure(String),

    #[error("Invalid search clause: {0}")]
    InvalidClause(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Store has not been started")]
    StoreNotStarted,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for JoinBaseError {
    fn from(err: serde_json::Error) -> Self {
        JoinBaseError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JoinBaseError>;
