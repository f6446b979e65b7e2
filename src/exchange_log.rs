//! Append-only exchange log
//!
//! One JSON object per line in `<dir>/YYYY-MM-DD-conv.json` (local date).
//! The file is opened in append mode for every record; no handle is kept.

use crate::conversation::SessionSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum ExchangeLogError {
    #[error("Failed to write exchange log: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize exchange record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Chat,
    Upvote,
    Downvote,
    Flag,
}

/// Feedback a user can leave on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Upvote,
    Downvote,
    Flag,
}

impl From<VoteKind> for ExchangeKind {
    fn from(kind: VoteKind) -> Self {
        match kind {
            VoteKind::Upvote => ExchangeKind::Upvote,
            VoteKind::Downvote => ExchangeKind::Downvote,
            VoteKind::Flag => ExchangeKind::Flag,
        }
    }
}

/// One logged fact. Never modified after it is written.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord {
    pub tstamp: f64,
    #[serde(rename = "type")]
    pub kind: ExchangeKind,
    pub model: String,
    /// Empty for chat records
    pub comments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish: Option<f64>,
    pub state: SessionSnapshot,
    pub ip: String,
}

impl ExchangeRecord {
    /// Record of one relayed generation, `start`/`finish` in unix seconds
    pub fn chat(
        model: impl Into<String>,
        start: f64,
        finish: f64,
        state: SessionSnapshot,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            tstamp: round_seconds(finish),
            kind: ExchangeKind::Chat,
            model: model.into(),
            comments: String::new(),
            start: Some(round_seconds(start)),
            finish: Some(round_seconds(finish)),
            state,
            ip: ip.into(),
        }
    }

    pub fn vote(
        kind: VoteKind,
        model: impl Into<String>,
        comments: Option<String>,
        state: SessionSnapshot,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            tstamp: round_seconds(unix_seconds()),
            kind: kind.into(),
            model: model.into(),
            comments: comments.unwrap_or_default(),
            start: None,
            finish: None,
            state,
            ip: ip.into(),
        }
    }
}

/// Current wall-clock time as fractional unix seconds
#[allow(clippy::cast_precision_loss)]
pub fn unix_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn round_seconds(seconds: f64) -> f64 {
    (seconds * 10_000.0).round() / 10_000.0
}

/// Destination for exchange records
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    async fn append(&self, record: &ExchangeRecord) -> Result<(), ExchangeLogError>;
}

/// Date-partitioned JSON-lines files under one directory
pub struct ExchangeLogger {
    log_dir: PathBuf,
}

impl ExchangeLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    /// File receiving today's records
    pub fn current_path(&self) -> PathBuf {
        let date = chrono::Local::now().format("%Y-%m-%d");
        self.log_dir.join(format!("{date}-conv.json"))
    }
}

#[async_trait]
impl ExchangeStore for ExchangeLogger {
    async fn append(&self, record: &ExchangeRecord) -> Result<(), ExchangeLogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let path = self.current_path();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        tracing::debug!(path = %path.display(), kind = ?record.kind, "Appended exchange record");
        Ok(())
    }
}
