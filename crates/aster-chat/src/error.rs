//! Error types for the conversation engine.

use aster_core::AsterError;

/// Errors from the chat engine.
///
/// Construction errors abort startup; the remaining variants reject a turn
/// before any session state is touched.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("invalid pattern for intent '{intent}': {reason}")]
    InvalidPattern { intent: String, reason: String },
    #[error("intent '{intent}' is bound to missing knowledge path: {path}")]
    UnboundKnowledgePath { intent: String, path: String },
    #[error("knowledge error: {0}")]
    Knowledge(String),
}

impl From<AsterError> for ChatError {
    fn from(err: AsterError) -> Self {
        ChatError::Knowledge(err.to_string())
    }
}
