use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by connectors.
///
/// Absence is never an error: an empty change log is an empty `Vec`.
#[derive(Error, Debug)]
pub enum Error {
    /// Empty or invalid connection string, statement text or input value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store could not be opened or closed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The tracking table could not be created, typically because it exists.
    #[error("schema error: {0}")]
    Schema(String),

    /// A change-log entry collided with an existing primary key.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A statement was malformed or rejected by the store.
    #[error("query error: {0}")]
    Query(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Conditions an orchestrator may treat as expected in specific flows:
    /// a repeated bootstrap or a repeated record.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Schema(_) | Error::Integrity(_))
    }
}
