//! Error types for the journal.

use thiserror::Error;

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors surfaced by [`EventJournal`](crate::EventJournal).
///
/// Every variant names the failing journal method. A failed operation left
/// no partial state behind: the surrounding transaction was rolled back.
#[derive(Error, Debug)]
pub enum JournalError {
    /// The underlying SQL store failed.
    #[error("journal {method} failed: {source}")]
    Storage {
        /// Journal method that failed.
        method: &'static str,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A stored row could not be decoded.
    #[error("journal {method} failed: {message}")]
    Encoding {
        /// Journal method that failed.
        method: &'static str,
        /// Decode failure description.
        message: String,
    },

    /// The caller-supplied write effect failed.
    #[error("journal {method} failed: effect error: {message}")]
    Effect {
        /// Journal method that failed.
        method: &'static str,
        /// Effect failure description.
        message: String,
    },

    /// The journal was destroyed and can no longer be used.
    #[error("journal {method} failed: journal destroyed")]
    Destroyed {
        /// Journal method that failed.
        method: &'static str,
    },
}

impl JournalError {
    /// Creates a destroyed-journal error.
    pub fn destroyed(method: &'static str) -> Self {
        JournalError::Destroyed { method }
    }

    /// Creates an effect error.
    pub fn effect(method: &'static str, message: impl Into<String>) -> Self {
        JournalError::Effect {
            method,
            message: message.into(),
        }
    }

    /// Maps a SQLite error onto the journal taxonomy for one method.
    ///
    /// Row-decode failures become [`JournalError::Encoding`]; everything
    /// else is [`JournalError::Storage`].
    pub(crate) fn map(method: &'static str) -> impl Fn(rusqlite::Error) -> JournalError {
        move |source| match source {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => JournalError::Encoding {
                method,
                message: source.to_string(),
            },
            source => JournalError::Storage { method, source },
        }
    }
}
