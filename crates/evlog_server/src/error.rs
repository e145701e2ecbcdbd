//! Error types for server storage.

use thiserror::Error;

/// Result type for server storage operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by [`Storage`](crate::Storage).
///
/// Every variant names the failing storage method. A failed operation left
/// no partial state behind: the surrounding transaction was rolled back.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The underlying SQL store failed.
    #[error("storage {method} failed: {source}")]
    Database {
        /// Storage method that failed.
        method: &'static str,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A stored row could not be decoded.
    #[error("storage {method} failed: {message}")]
    Encoding {
        /// Storage method that failed.
        method: &'static str,
        /// Decode failure description.
        message: String,
    },
}

impl ServerError {
    /// Maps a SQLite error onto the storage taxonomy for one method.
    pub(crate) fn map(method: &'static str) -> impl Fn(rusqlite::Error) -> ServerError {
        move |source| match source {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => ServerError::Encoding {
                method,
                message: source.to_string(),
            },
            source => ServerError::Database { method, source },
        }
    }
}
