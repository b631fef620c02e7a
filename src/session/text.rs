use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::speech::DialogueEngine;
use crate::storage::User;
use crate::transport::{Frame, FrameKind, FrameReader, FrameWriter};

const INIT_FAILED_REPLY: &str = "Error initializing session.";
const CHAT_FAILED_REPLY: &str = "Error processing your message.";

/// Text-only conversation: strictly one reply per received message, no
/// speech stages and no archive
///
/// Returns the number of completed turns.
pub async fn run_text_session<R: FrameReader, W: FrameWriter>(
    mut reader: R,
    mut writer: W,
    user: &User,
    scenario_key: &str,
    dialogue: Arc<dyn DialogueEngine>,
    cancel: CancellationToken,
) -> Result<u64> {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(
        "Text session {} started for user {} (scenario: {})",
        session_id, user.username, scenario_key
    );

    let result = converse(
        &mut reader,
        &mut writer,
        user,
        scenario_key,
        &session_id,
        dialogue.as_ref(),
        &cancel,
    )
    .await;

    if let Err(e) = dialogue.clear_session(&session_id).await {
        warn!("Failed to clear dialogue session {}: {:#}", session_id, e);
    }
    if let Err(e) = writer.close().await {
        warn!("Close notification to {} failed: {:#}", user.username, e);
    }

    info!("Text session {} ended for user {}", session_id, user.username);
    result
}

async fn converse<R: FrameReader, W: FrameWriter>(
    reader: &mut R,
    writer: &mut W,
    user: &User,
    scenario_key: &str,
    session_id: &str,
    dialogue: &dyn DialogueEngine,
    cancel: &CancellationToken,
) -> Result<u64> {
    let greeting = match dialogue.init_session(session_id, scenario_key, &user.profile).await {
        Ok(greeting) => greeting,
        Err(e) => {
            error!("Dialogue init failed for user {}: {:#}", user.username, e);
            writer.write_frame(Frame::text(INIT_FAILED_REPLY)).await?;
            return Ok(0);
        }
    };

    info!("Greeting for user {}: {}", user.username, greeting);
    writer.write_frame(Frame::text(greeting)).await?;

    let mut turns = 0u64;
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Text session cancelled for user {}", user.username);
                break;
            }
            frame = reader.read_frame() => frame,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading message from user {}: {:#}", user.username, e);
                break;
            }
        };

        if frame.kind != FrameKind::Text {
            warn!("Unsupported {:?} frame from user {}, discarding", frame.kind, user.username);
            continue;
        }

        let text = String::from_utf8_lossy(&frame.payload).into_owned();
        info!("Received text message from user {}: {}", user.username, text);

        let reply = tokio::select! {
            _ = cancel.cancelled() => break,
            reply = dialogue.chat(session_id, &text) => reply,
        };

        match reply {
            Ok(reply) => {
                writer.write_frame(Frame::text(reply.utterance)).await?;
                turns += 1;
            }
            Err(e) => {
                error!("Dialogue chat failed for user {}: {:#}", user.username, e);
                writer.write_frame(Frame::text(CHAT_FAILED_REPLY)).await?;
            }
        }
    }

    Ok(turns)
}
