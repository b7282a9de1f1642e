//! Error handling
//!
//! Typed errors for the collaboration core, one variant per failure class.
//! Transport and protocol failures are retried by the session; permission
//! and persistence failures are surfaced to the caller; aborted moves are a
//! normal outcome of a drag and are never shown to the user.

use thiserror::Error;

use crate::ids::DocumentId;

/// Errors that can occur in the collaboration core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollabError {
    /// Connection never opened or closed abnormally
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed handshake or frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Save attempted without write access
    #[error("Permission denied for document '{document_id}' (can_write={can_write}, read_only={is_read_only})")]
    Permission {
        document_id: DocumentId,
        can_write: bool,
        is_read_only: bool,
    },

    /// Backend rejected a save or snapshot call
    #[error("Persistence error during {operation}: {details}")]
    Persistence {
        operation: &'static str,
        status: Option<u16>,
        details: String,
    },

    /// No legal drop target for a structural move
    #[error("Move aborted: {0}")]
    MoveAborted(String),
}

impl CollabError {
    /// Build a persistence error without an HTTP status
    pub fn persistence(operation: &'static str, details: impl Into<String>) -> Self {
        CollabError::Persistence {
            operation,
            status: None,
            details: details.into(),
        }
    }

    /// Check if this error may succeed when attempted again
    pub fn is_retryable(&self) -> bool {
        match self {
            CollabError::Transport(_) | CollabError::Protocol(_) => true,
            // 4xx other than timeouts/rate limits will fail the same way again
            CollabError::Persistence {
                status: Some(code), ..
            } => !(400..500).contains(code) || *code == 408 || *code == 429,
            CollabError::Persistence { .. } => true,
            CollabError::Permission { .. } | CollabError::MoveAborted(_) => false,
        }
    }

    /// Short indicator text for the user, if this error is user visible
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            CollabError::Transport(_) | CollabError::Protocol(_) => Some("Reconnecting..."),
            CollabError::Permission { .. } => Some("You don't have permission to edit this document."),
            CollabError::Persistence { .. } => Some("Failed to save changes."),
            CollabError::MoveAborted(_) => None,
        }
    }
}

/// Result type for collaboration operations
pub type CollabResult<T> = Result<T, CollabError>;
