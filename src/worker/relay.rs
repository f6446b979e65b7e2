//! Streaming relay: turns worker frames into paced visible updates

use super::frame::{echo_skip_len, strip_cursor, visible_output, CURSOR};
use super::{GenerateParams, RelayError, WorkerClient, WorkerFrame};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Shown in place of the response when the worker cannot be reached
pub const SERVER_ERROR_MSG: &str =
    "**NETWORK ERROR DUE TO HIGH TRAFFIC. PLEASE REGENERATE OR REFRESH THIS PAGE.**";

/// Error code reported for transport faults on our side
const TRANSPORT_ERROR_CODE: i64 = 4;

/// Delay between forwarded partial updates
pub const DEFAULT_PACING: Duration = Duration::from_millis(20);

const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// A generation call plus how much prompt echo to drop from its frames
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub params: GenerateParams,
    pub skip_len: usize,
}

impl RelayRequest {
    pub fn new(params: GenerateParams) -> Self {
        let skip_len = echo_skip_len(&params.prompt);
        Self { params, skip_len }
    }
}

/// How a relay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Final visible text, cursor removed
    Completed { text: String },
    /// Worker reported an error; `message` is what the user sees
    WorkerError { message: String, code: i64 },
    /// Transport fault; `message` is what the user sees
    TransportFailed { message: String },
}

impl RelayOutcome {
    fn from_error_frame(frame: WorkerFrame) -> Self {
        RelayOutcome::WorkerError {
            message: format!("{} (error_code: {})", frame.text, frame.error_code),
            code: frame.error_code,
        }
    }

    fn from_transport(err: &RelayError) -> Self {
        tracing::warn!(error = %err, "Worker transport failed");
        Self::transport_failed()
    }

    /// Generic service error shown for any transport fault
    pub fn transport_failed() -> Self {
        RelayOutcome::TransportFailed {
            message: format!("{SERVER_ERROR_MSG} (error_code: {TRANSPORT_ERROR_CODE})"),
        }
    }
}

/// Update emitted by a streaming relay. `Done` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayUpdate {
    /// Visible text so far with the cursor appended
    Partial(String),
    Done(RelayOutcome),
}

pub struct StreamingRelay<W: ?Sized> {
    client: Arc<W>,
    pacing: Duration,
}

impl<W: ?Sized> Clone for StreamingRelay<W> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            pacing: self.pacing,
        }
    }
}

impl<W: WorkerClient + ?Sized + 'static> StreamingRelay<W> {
    pub fn new(client: Arc<W>, pacing: Duration) -> Self {
        Self { client, pacing }
    }

    /// Single-shot generation
    pub async fn run_unary(&self, worker: &str, request: &RelayRequest) -> RelayOutcome {
        match self.client.generate(worker, &request.params).await {
            Ok(frame) if frame.is_error() => RelayOutcome::from_error_frame(frame),
            Ok(frame) => RelayOutcome::Completed {
                text: visible_output(&frame.text, request.skip_len),
            },
            Err(e) => RelayOutcome::from_transport(&e),
        }
    }

    /// Start streaming generation in the background.
    ///
    /// The relay stops reading from the worker as soon as `cancel` fires or
    /// the receiver is dropped. Otherwise the last update is always `Done`.
    pub fn spawn_stream(
        &self,
        worker: String,
        request: RelayRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<RelayUpdate> {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let client = self.client.clone();
        let pacing = self.pacing;
        tokio::spawn(async move {
            pump(client.as_ref(), &worker, &request, &tx, &cancel, pacing).await;
        });
        rx
    }
}

async fn pump<W: WorkerClient + ?Sized>(
    client: &W,
    worker: &str,
    request: &RelayRequest,
    tx: &mpsc::Sender<RelayUpdate>,
    cancel: &CancellationToken,
    pacing: Duration,
) {
    let started = Instant::now();
    let model = request.params.model.as_str();

    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = tx.closed() => return,
        opened = client.generate_stream(worker, &request.params) => opened,
    };
    let mut frames = match opened {
        Ok(frames) => frames,
        Err(e) => {
            let _ = tx.send(RelayUpdate::Done(RelayOutcome::from_transport(&e))).await;
            return;
        }
    };

    let mut visible = CURSOR.to_string();
    let mut frame_count = 0usize;
    let outcome = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(model, worker, frames = frame_count, "Relay cancelled");
                return;
            }
            () = tx.closed() => {
                tracing::info!(model, worker, frames = frame_count, "Relay receiver dropped");
                return;
            }
            next = frames.next() => next,
        };

        match next {
            None => {
                break RelayOutcome::Completed {
                    text: strip_cursor(&visible),
                }
            }
            Some(Err(e)) => break RelayOutcome::from_transport(&e),
            Some(Ok(frame)) if frame.is_error() => break RelayOutcome::from_error_frame(frame),
            Some(Ok(frame)) => {
                frame_count += 1;
                visible = visible_output(&frame.text, request.skip_len);
                visible.push(CURSOR);
                if tx.send(RelayUpdate::Partial(visible.clone())).await.is_err() {
                    return;
                }
                tokio::time::sleep(pacing).await;
            }
        }
    };

    tracing::info!(
        model,
        worker,
        frames = frame_count,
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        completed = matches!(outcome, RelayOutcome::Completed { .. }),
        "Relay finished"
    );
    let _ = tx.send(RelayUpdate::Done(outcome)).await;
}
