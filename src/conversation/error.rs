//! Conversation errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Invalid separator style: {0}")]
    InvalidSeparatorStyle(String),
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),
    #[error("Turn {index} has role {found}, expected {expected}")]
    BrokenAlternation {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Pending response turn at {0} is not the last turn")]
    PendingNotLast(usize),
    #[error("Template {0} has an odd number of preamble turns")]
    OddPreamble(String),
    #[error("Session already has a response pending")]
    ResponsePending,
    #[error("Session has no pending response")]
    NoPendingResponse,
    #[error("History offset {offset} does not match template offset {expected}")]
    OffsetMismatch { offset: usize, expected: usize },
    #[error("Failed to read template file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse template file: {0}")]
    Parse(#[from] serde_json::Error),
}
