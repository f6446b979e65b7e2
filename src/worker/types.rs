//! Worker wire types

use serde::{Deserialize, Serialize};

/// Body of `worker_generate` and `worker_generate_stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateParams {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_new_tokens: u32,
    pub stop: String,
}

/// One worker response frame.
///
/// `text` is cumulative and starts with the echoed prompt. A non-zero
/// `error_code` is terminal and `text` then holds an error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFrame {
    pub text: String,
    pub error_code: i64,
}

impl WorkerFrame {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error_code: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }
}
