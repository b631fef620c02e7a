//! The two loops that move frames between the live connection and the
//! session's internal queues. Nothing else in a session touches the transport.

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::frame::{Frame, FrameKind, FrameReader, FrameWriter};
use crate::audio::AudioFrame;

/// Forward binary frames from the connection into `caller_tx` in arrival order
///
/// Ends on cancellation, read error, or peer close. `caller_tx` is consumed,
/// so the queue is closed exactly once when the pump returns.
pub async fn read_pump<R: FrameReader>(
    mut reader: R,
    username: &str,
    caller_tx: mpsc::Sender<AudioFrame>,
    cancel: CancellationToken,
) -> Result<u64> {
    info!("Read pump started for user: {}", username);
    let mut forwarded = 0u64;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Read pump cancelled for user: {}", username);
                break;
            }
            result = reader.read_frame() => result,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Connection closed by user: {}", username);
                break;
            }
            Err(e) => {
                error!("Error reading frame from user {}: {:#}", username, e);
                break;
            }
        };

        if frame.kind != FrameKind::Binary {
            warn!(
                "Unsupported {:?} frame from user {} ({} bytes), discarding",
                frame.kind,
                username,
                frame.payload.len()
            );
            continue;
        }

        // Blocks while the orchestrator is behind; cancellation still wins.
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = caller_tx.send(AudioFrame::new(frame.payload)) => {
                if sent.is_err() {
                    debug!("Caller audio queue dropped for user: {}", username);
                    break;
                }
            }
        }
        forwarded += 1;
    }

    drop(caller_tx);
    info!("Read pump stopped for user {} ({} frames)", username, forwarded);
    Ok(forwarded)
}

/// Write every queued reply frame to the connection as a binary frame
///
/// On cancellation or when the upstream queue closes the peer gets a
/// best-effort close notification. A failed write ends the pump.
pub async fn write_pump<W: FrameWriter>(
    mut writer: W,
    username: &str,
    mut reply_rx: mpsc::Receiver<AudioFrame>,
    cancel: CancellationToken,
) -> Result<u64> {
    info!("Write pump started for user: {}", username);
    let mut written = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Write pump cancelled for user: {}", username);
                notify_close(&mut writer, username).await;
                break;
            }
            next = reply_rx.recv() => match next {
                Some(frame) => {
                    let len = frame.len();
                    if let Err(e) = writer.write_frame(Frame::binary(frame.into_bytes())).await {
                        error!("Error sending audio to user {}: {:#}", username, e);
                        return Err(e);
                    }
                    written += 1;
                    debug!("Sent audio to user {}: {} bytes", username, len);
                }
                None => {
                    info!("Reply queue closed for user: {}", username);
                    notify_close(&mut writer, username).await;
                    break;
                }
            }
        }
    }

    Ok(written)
}

async fn notify_close<W: FrameWriter>(writer: &mut W, username: &str) {
    if let Err(e) = writer.close().await {
        debug!("Close notification to {} failed: {:#}", username, e);
    }
}
