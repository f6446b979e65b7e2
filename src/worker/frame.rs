//! Worker frame decoding and visible-output shaping
//!
//! Streaming workers write JSON objects terminated by a single NUL byte.
//! Every frame carries the full text generated so far, prompt included, so
//! the visible part is recovered by skipping the echoed prompt.

use super::{RelayError, WorkerFrame};
use futures::{Stream, StreamExt};
use std::time::Duration;

/// Appended to partial output while generation is in progress
pub const CURSOR: char = '▌';

const FRAME_DELIMITER: u8 = 0;
const CODE_FENCE: &str = "\n```";

/// Number of code points of the echoed prompt to drop from frame text.
///
/// Workers echo `</s>` markers as a single space and emit one extra
/// separator character before the generated text.
pub fn echo_skip_len(prompt: &str) -> usize {
    prompt.replace("</s>", " ").chars().count() + 1
}

/// Generated part of a cumulative frame, trimmed and fence-sanitized
pub fn visible_output(text: &str, skip_len: usize) -> String {
    let generated: String = text.chars().skip(skip_len).collect();
    sanitize_code_fences(generated.trim())
}

/// Undo markdown underscore escaping inside fenced code blocks.
///
/// Only applies when every fence is closed; odd-indexed segments between
/// fences are code.
pub fn sanitize_code_fences(text: &str) -> String {
    if !text.contains(CODE_FENCE) {
        return text.to_string();
    }
    let segments: Vec<&str> = text.split(CODE_FENCE).collect();
    if segments.len() % 2 == 0 {
        return text.to_string();
    }
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            if i % 2 == 1 {
                unescape_underscores(segment)
            } else {
                (*segment).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(CODE_FENCE)
}

/// Drop the backslash of a `\_` unless that backslash is itself escaped
fn unescape_underscores(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    let mut prev = None;
    while let Some(c) = chars.next() {
        let lone_escape = c == '\\' && prev != Some('\\') && chars.peek() == Some(&'_');
        if !lone_escape {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

pub fn strip_cursor(visible: &str) -> String {
    visible.strip_suffix(CURSOR).unwrap_or(visible).to_string()
}

#[derive(Debug, Default)]
struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete frame; empty chunks between delimiters are skipped
    fn next_frame(&mut self) -> Option<Result<WorkerFrame, RelayError>> {
        loop {
            let end = self.pending.iter().position(|b| *b == FRAME_DELIMITER)?;
            let mut chunk: Vec<u8> = self.pending.drain(..=end).collect();
            chunk.pop();
            if chunk.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(parse_frame(&chunk));
        }
    }

    /// Trailing bytes after the last delimiter, if any
    fn finish(&mut self) -> Option<Result<WorkerFrame, RelayError>> {
        let rest = std::mem::take(&mut self.pending);
        if rest.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(parse_frame(&rest))
        }
    }
}

fn parse_frame(chunk: &[u8]) -> Result<WorkerFrame, RelayError> {
    serde_json::from_slice(chunk).map_err(|e| {
        RelayError::MalformedFrame(format!("{e} - frame: {}", String::from_utf8_lossy(chunk)))
    })
}

/// Decode a raw byte stream into worker frames.
///
/// Each read must complete within `read_timeout`. The stream ends after the
/// first error.
pub fn decode_frames<S, B, E>(
    bytes: S,
    read_timeout: Duration,
) -> impl Stream<Item = Result<WorkerFrame, RelayError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (Box::pin(bytes), FrameBuffer::default(), false);
    futures::stream::unfold(state, move |(mut bytes, mut buffer, done)| async move {
        if done {
            return None;
        }
        loop {
            if let Some(frame) = buffer.next_frame() {
                let failed = frame.is_err();
                return Some((frame, (bytes, buffer, failed)));
            }
            match tokio::time::timeout(read_timeout, bytes.next()).await {
                Ok(Some(Ok(chunk))) => buffer.push(chunk.as_ref()),
                Ok(Some(Err(e))) => {
                    return Some((Err(RelayError::Transport(e.to_string())), (bytes, buffer, true)));
                }
                Ok(None) => {
                    return buffer.finish().map(|frame| (frame, (bytes, buffer, true)));
                }
                Err(_) => {
                    let err = RelayError::Timeout(format!(
                        "no data from worker for {}s",
                        read_timeout.as_secs()
                    ));
                    return Some((Err(err), (bytes, buffer, true)));
                }
            }
        }
    })
}
