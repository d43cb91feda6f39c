//! Storage-layer errors and their mapping into the core taxonomy.

use fieldsync_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Core(inner) => inner,
            StorageError::Query(diesel::result::Error::NotFound) => {
                Error::NotFound("Record not found".to_string())
            }
            StorageError::Query(inner) => {
                Error::Database(DatabaseError::QueryFailed(inner.to_string()))
            }
            StorageError::Connection(inner) => {
                Error::Database(DatabaseError::ConnectionFailed(inner.to_string()))
            }
            StorageError::Pool(inner) => {
                Error::Database(DatabaseError::ConnectionFailed(inner.to_string()))
            }
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Core(Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diesel_not_found_maps_to_core_not_found() {
        let err: Error = StorageError::from(diesel::result::Error::NotFound).into();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn core_errors_pass_through() {
        let err: Error = StorageError::from(Error::invalid_input("bad")).into();
        assert!(matches!(err, Error::Validation(_)));
    }
}
