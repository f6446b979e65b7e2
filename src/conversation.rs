//! Conversation data model and prompt rendering
//!
//! Templates describe how a backend model expects its prompt to be framed;
//! sessions hold the alternating turns that get rendered through them.

mod error;
mod registry;
mod session;
mod template;

pub use error::ConversationError;
pub use registry::TemplateRegistry;
pub use session::{
    CompleteTurn, DisplayPair, PendingTurn, Role, Session, SessionSnapshot, Turn,
};
pub use template::{ConversationTemplate, SeparatorStyle};

/// Hard cap on raw user input, in code points
pub const MAX_INPUT_CHARS: usize = 5000;

/// Truncate raw user input to [`MAX_INPUT_CHARS`] code points
pub fn truncate_input(text: &str) -> String {
    text.chars().take(MAX_INPUT_CHARS).collect()
}
