//! Error types for Grove.

use thiserror::Error;

/// Result type alias using GroveError.
pub type Result<T> = std::result::Result<T, GroveError>;

/// Errors that can occur in Grove operations.
#[derive(Debug, Error)]
pub enum GroveError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Record store errors
    #[error("Header slot out of range: {slot} (file has {slots} slots)")]
    HeaderSlotOutOfRange { slot: usize, slots: usize },

    #[error("Record {ordinal} does not exist (store has {count} records)")]
    RecordOutOfBounds { ordinal: u32, count: u32 },

    #[error("Record size mismatch: expected {expected}, got {actual}")]
    RecordSizeMismatch { expected: usize, actual: usize },

    // Tree errors
    #[error("Tree corrupted: {0}")]
    Corrupted(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
