//! Error types for conversation handling and persistence

use crate::storage::StoreError;
use thiserror::Error;

/// Errors returned by conversation, resolution and persistence operations.
///
/// Handler errors raised during tool-call resolution are not wrapped here;
/// they reach the caller in the handler's own error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No blob store configured for a save/load/delete.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value could not be represented as JSON.
    #[error("Encoding error: {0}")]
    Encoding(#[source] serde_json::Error),

    /// Malformed JSON in tool-call arguments or a stored envelope.
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    /// The blob store reported a failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ChatError {
    pub fn store_not_configured() -> Self {
        Self::Configuration("blob store not configured".to_string())
    }

    pub fn kind(&self) -> ChatErrorKind {
        match self {
            Self::Configuration(_) => ChatErrorKind::Configuration,
            Self::Encoding(_) => ChatErrorKind::Encoding,
            Self::Parse(_) => ChatErrorKind::Parse,
            Self::Storage(_) => ChatErrorKind::Storage,
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    Configuration,
    Encoding,
    Parse,
    Storage,
}

impl ChatErrorKind {
    /// Whether the failure came from the backend rather than from the data
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage)
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
