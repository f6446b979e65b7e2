//! NUL-delimited JSON reply streams
//!
//! Each state change of a streaming turn is written as one JSON object
//! followed by a NUL byte, the same framing workers use one layer down.

use crate::runtime::TurnReply;
use axum::body::{Body, Bytes};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Frame terminator on the wire
pub const FRAME_DELIMITER: u8 = 0;

/// Encode one reply as a delimited frame
pub fn encode_frame(reply: &TurnReply) -> Result<Bytes, serde_json::Error> {
    let mut frame = serde_json::to_vec(reply)?;
    frame.push(FRAME_DELIMITER);
    Ok(Bytes::from(frame))
}

/// Response body streaming every reply as it arrives.
///
/// Dropping the body (caller disconnect) drops the receiver, which cancels
/// the turn.
pub fn reply_body(replies: mpsc::Receiver<TurnReply>) -> Body {
    let frames = ReceiverStream::new(replies).map(|reply| encode_frame(&reply));
    Body::from_stream(frames)
}
