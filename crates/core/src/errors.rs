//! Error taxonomy shared by every FieldSync crate.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The local store could not be opened or initialized. Fatal for every
    /// later store operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Writer unavailable: {0}")]
    WriterUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::InvalidInput(message.into()))
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::Validation(ValidationError::MissingField(field.into()))
    }

    /// True when the error means the store itself is gone, as opposed to a
    /// single failed statement.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::Database(DatabaseError::ConnectionFailed(_))
                | Self::Database(DatabaseError::WriterUnavailable(_))
        )
    }
}
