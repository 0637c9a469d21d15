//! Error types for domain validation.
//!
//! Validation failures happen at the queue boundary, before an operation is
//! ever created, so they are never retried.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Validation errors raised while building operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Channel name is empty or longer than the allowed maximum.
    #[error("invalid channel length {length} for {channel:?}")]
    InvalidChannelLength {
        /// Raw channel name as received
        channel: String,
        /// Length in bytes
        length: usize,
    },

    /// Channel name contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid characters in channel {channel:?} (normalized {normalized:?})")]
    InvalidChannelCharacters {
        /// Raw channel name as received
        channel: String,
        /// Channel with disallowed characters stripped
        normalized: String,
    },
}

impl CoreError {
    /// Returns the raw channel that failed validation.
    pub fn channel(&self) -> &str {
        match self {
            Self::InvalidChannelLength { channel, .. }
            | Self::InvalidChannelCharacters { channel, .. } => channel,
        }
    }
}
