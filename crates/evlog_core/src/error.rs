//! Error types for the core crate.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the core primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Encoding a value to its wire representation failed.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Decoding a wire payload failed.
    #[error("decoding failed: {0}")]
    Decoding(String),

    /// An entry id was not exactly 16 bytes.
    #[error("invalid entry id length: {actual} bytes (expected 16)")]
    InvalidEntryId {
        /// Length of the rejected input.
        actual: usize,
    },

    /// A key had the wrong size.
    #[error("invalid key size: {actual} bytes (expected {expected})")]
    InvalidKeySize {
        /// Length of the rejected input.
        actual: usize,
        /// Required length.
        expected: usize,
    },

    /// Payload encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Payload decryption failed.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

impl CoreError {
    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        CoreError::Encoding(message.into())
    }

    /// Creates a decoding error.
    pub fn decoding(message: impl Into<String>) -> Self {
        CoreError::Decoding(message.into())
    }

    /// Creates an invalid-entry-id error.
    pub fn invalid_entry_id(actual: usize) -> Self {
        CoreError::InvalidEntryId { actual }
    }

    /// Creates an invalid-key-size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        CoreError::InvalidKeySize { actual, expected }
    }

    /// Creates an encryption failure.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        CoreError::EncryptionFailed(message.into())
    }

    /// Creates a decryption failure.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        CoreError::DecryptionFailed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::invalid_entry_id(4);
        assert!(err.to_string().contains("4 bytes"));

        let err = CoreError::invalid_key_size(16, 32);
        let msg = err.to_string();
        assert!(msg.contains("16"));
        assert!(msg.contains("32"));
    }
}
