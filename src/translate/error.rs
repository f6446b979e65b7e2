//! Translation service errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Translation service unreachable: {0}")]
    Transport(String),
    #[error("Translation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed translation response: {0}")]
    Malformed(String),
    #[error("Invalid translation client configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TranslateError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TranslateError::Malformed(e.to_string())
        } else {
            TranslateError::Transport(e.to_string())
        }
    }
}
