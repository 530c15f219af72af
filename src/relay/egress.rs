use std::{fmt::Display, future::Future};

use axum::body::Bytes;
use futures::{Sink, SinkExt};
use tokio_util::sync::CancellationToken;

use super::frames::FrameQueue;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Sends frames from `queue` to one viewer until the send fails, the viewer
/// closes, or the server shuts down. Returns the number of frames sent.
pub async fn forward_frames<S, C>(
    queue: &FrameQueue,
    sink: &mut S,
    closed: C,
    shutdown: CancellationToken,
) -> u64
where
    S: Sink<Bytes> + Unpin,
    S::Error: Display,
    C: Future<Output = ()>,
{
    let mut closed = std::pin::pin!(closed);
    let mut sent = 0;

    loop {
        tokio::select! {
            frame = queue.pop() => {
                if let Err(err) = sink.send(frame).await {
                    log_debug!("viewer send failed after {} frames: {err}", sent);
                    break;
                }
                sent += 1;
            }
            _ = &mut closed => {
                log_debug!("viewer closed after {} frames", sent);
                break;
            }
            _ = shutdown.cancelled() => break,
        }
    }

    sent
}
