//! Remote generation workers
//!
//! Workers are located through the controller and accept a rendered prompt,
//! answering either once or with a stream of NUL-delimited cumulative frames.

mod client;
mod controller;
mod error;
mod frame;
mod relay;
mod types;

#[cfg(test)]
mod proptests;

pub use client::HttpWorkerClient;
pub use controller::{sort_models, ControllerClient};
pub use error::{LocatorError, RelayError};
pub use frame::{
    decode_frames, echo_skip_len, sanitize_code_fences, strip_cursor, visible_output, CURSOR,
};
pub use relay::{
    RelayOutcome, RelayRequest, RelayUpdate, StreamingRelay, DEFAULT_PACING, SERVER_ERROR_MSG,
};
pub use types::{GenerateParams, WorkerFrame};

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Frames decoded from a streaming generation response
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<WorkerFrame, RelayError>> + Send>>;

/// Resolves logical model names to live worker endpoints
#[async_trait]
pub trait WorkerLocator: Send + Sync {
    /// Address of a worker serving `model_id`; empty when none is available
    async fn resolve(&self, model_id: &str) -> Result<String, LocatorError>;

    /// Models currently served, in display order
    async fn list_models(&self) -> Result<Vec<String>, LocatorError>;
}

/// Transport to a generation worker
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Single blocking generation call
    async fn generate(&self, worker: &str, params: &GenerateParams)
        -> Result<WorkerFrame, RelayError>;

    /// Open a streaming generation call
    async fn generate_stream(
        &self,
        worker: &str,
        params: &GenerateParams,
    ) -> Result<FrameStream, RelayError>;
}
