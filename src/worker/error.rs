//! Worker and controller errors

use thiserror::Error;

/// Failure talking to the controller
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Controller unreachable: {0}")]
    Transport(String),
    #[error("Controller returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed controller response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for LocatorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LocatorError::Malformed(e.to_string())
        } else {
            LocatorError::Transport(e.to_string())
        }
    }
}

/// Transport-level failure talking to a worker
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Request timeout: {0}")]
    Timeout(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Worker returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed worker frame: {0}")]
    MalformedFrame(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RelayError::Timeout(e.to_string())
        } else if e.is_connect() {
            RelayError::Connect(e.to_string())
        } else if e.is_decode() {
            RelayError::MalformedFrame(e.to_string())
        } else {
            RelayError::Transport(e.to_string())
        }
    }
}
