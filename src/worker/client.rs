//! HTTP transport to generation workers

use super::{decode_frames, FrameStream, GenerateParams, RelayError, WorkerClient, WorkerFrame};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;

/// Whole-request limit for single-shot generation
pub const UNARY_TIMEOUT: Duration = Duration::from_secs(190);
/// Connect limit and per-read limit for streaming generation
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(20);

pub struct HttpWorkerClient {
    client: Client,
    unary_timeout: Duration,
    stream_timeout: Duration,
}

impl HttpWorkerClient {
    pub fn new() -> Result<Self, RelayError> {
        Self::with_timeouts(UNARY_TIMEOUT, STREAM_TIMEOUT)
    }

    pub fn with_timeouts(
        unary_timeout: Duration,
        stream_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = Client::builder()
            .user_agent(concat!("chat-relay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(stream_timeout)
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            unary_timeout,
            stream_timeout,
        })
    }
}

fn endpoint(worker: &str, path: &str) -> String {
    format!("{}/{path}", worker.trim_end_matches('/'))
}

async fn check_status(response: Response) -> Result<Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RelayError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn generate(
        &self,
        worker: &str,
        params: &GenerateParams,
    ) -> Result<WorkerFrame, RelayError> {
        let response = self
            .client
            .post(endpoint(worker, "worker_generate"))
            .timeout(self.unary_timeout)
            .json(params)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<WorkerFrame>().await?)
    }

    async fn generate_stream(
        &self,
        worker: &str,
        params: &GenerateParams,
    ) -> Result<FrameStream, RelayError> {
        let request = self
            .client
            .post(endpoint(worker, "worker_generate_stream"))
            .json(params)
            .send();
        let response = tokio::time::timeout(self.stream_timeout, request)
            .await
            .map_err(|_| {
                RelayError::Timeout(format!(
                    "worker did not answer within {}s",
                    self.stream_timeout.as_secs()
                ))
            })??;
        let response = check_status(response).await?;

        Ok(Box::pin(decode_frames(
            response.bytes_stream(),
            self.stream_timeout,
        )))
    }
}
