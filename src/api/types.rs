//! API request and response types

use crate::conversation::Session;
use crate::exchange_log::VoteKind;
use crate::runtime::TurnRequest;
use serde::{Deserialize, Serialize};

fn default_temperature() -> f32 {
    0.7
}

fn default_max_new_tokens() -> u32 {
    512
}

/// Request to run one turn, unary or streamed
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub text: String,
    /// Session from a previous reply; omitted to start a new one
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
}

impl From<GenerateRequest> for TurnRequest {
    fn from(req: GenerateRequest) -> Self {
        TurnRequest {
            model: req.model,
            session: req.session,
            text: req.text,
            temperature: req.temperature,
            max_new_tokens: req.max_new_tokens,
        }
    }
}

/// Feedback on a session
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub kind: VoteKind,
    pub model: String,
    #[serde(default)]
    pub comments: Option<String>,
    pub session: Session,
}

/// Response with a fresh session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: Session,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// Response for actions without a payload
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
