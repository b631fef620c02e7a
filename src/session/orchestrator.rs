//! Turn-taking state machine at the centre of an audio session
//!
//! The main loop is the only writer of the turn state. Each reply (the
//! greeting, then one per accepted transcript) runs as a supervised task in a
//! `JoinSet`; its completion is just another event in the main `select!`, so
//! every `Listening`/`Responding` transition happens in one place.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::ArchiveChunk;
use crate::audio::AudioFrame;
use crate::speech::{DialogueEngine, RecognitionStream, Synthesizer, TranscriptEvent};
use crate::storage::User;

const TRANSCRIPT_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Caller audio is forwarded to recognition; a final transcript starts a reply
    Listening,
    /// A reply is being produced; caller audio is archived but not recognized
    Responding,
}

/// Phase plus the last accepted utterance, always read and written together
#[derive(Debug)]
pub(crate) struct TurnState {
    phase: TurnPhase,
    last_accepted: Option<String>,
}

impl TurnState {
    pub(crate) fn new(phase: TurnPhase) -> Self {
        Self {
            phase,
            last_accepted: None,
        }
    }

    pub(crate) fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Decide whether `event` starts a reply
    ///
    /// Returns the trimmed utterance and moves to `Responding` when it does.
    pub(crate) fn accept(&mut self, event: &TranscriptEvent) -> Option<String> {
        if !event.is_final || self.phase != TurnPhase::Listening {
            return None;
        }

        let text = event.text.trim();
        if text.is_empty() || self.last_accepted.as_deref() == Some(text) {
            return None;
        }

        self.phase = TurnPhase::Responding;
        self.last_accepted = Some(text.to_string());
        Some(text.to_string())
    }

    pub(crate) fn finish_reply(&mut self) {
        self.phase = TurnPhase::Listening;
    }
}

/// Queues connecting the orchestrator to the pumps and the archive worker
pub struct OrchestratorLinks {
    pub caller_rx: mpsc::Receiver<AudioFrame>,
    pub reply_tx: mpsc::Sender<AudioFrame>,
    pub archive_caller_tx: mpsc::Sender<AudioFrame>,
    pub archive_reply_tx: mpsc::Sender<ArchiveChunk>,
}

/// Speech collaborators opened for one session
#[derive(Clone)]
pub struct SpeechHandles {
    pub recognizer: Arc<dyn RecognitionStream>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub dialogue: Arc<dyn DialogueEngine>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorReport {
    pub caller_frames: u64,
    pub frames_recognized: u64,
    pub replies_emitted: u64,
    pub failed_turns: u64,
    pub ignored_transcripts: u64,
}

#[derive(Debug, Clone)]
enum ReplyRequest {
    Greeting,
    Answer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyOutcome {
    Emitted,
    Failed,
    Cancelled,
}

/// Everything a reply worker needs, cloned per reply
#[derive(Clone)]
struct ReplyContext {
    session_id: String,
    user: User,
    scenario_key: String,
    synthesizer: Arc<dyn Synthesizer>,
    dialogue: Arc<dyn DialogueEngine>,
    reply_tx: mpsc::Sender<AudioFrame>,
    archive_reply_tx: mpsc::Sender<ArchiveChunk>,
    cancel: CancellationToken,
}

pub struct Orchestrator {
    session_id: String,
    user: User,
    scenario_key: String,
    started_at: Instant,
    speech: SpeechHandles,
    cancel: CancellationToken,
    phase_tx: watch::Sender<TurnPhase>,
}

impl Orchestrator {
    pub fn new(
        session_id: String,
        user: User,
        scenario_key: String,
        started_at: Instant,
        speech: SpeechHandles,
        cancel: CancellationToken,
        phase_tx: watch::Sender<TurnPhase>,
    ) -> Self {
        Self {
            session_id,
            user,
            scenario_key,
            started_at,
            speech,
            cancel,
            phase_tx,
        }
    }

    /// Run until cancelled, caller audio ends, or recognition fails
    ///
    /// Only a recognition stream fault is returned as an error. Turn-level
    /// failures are absorbed and the machine goes back to listening.
    pub async fn run(self, mut links: OrchestratorLinks) -> Result<OrchestratorReport> {
        let username = self.user.username.clone();
        info!("Orchestrator started for user {}, session {}", username, self.session_id);

        let (transcript_tx, mut transcript_rx) = mpsc::channel(TRANSCRIPT_QUEUE);
        let (error_tx, mut error_rx) = mpsc::channel(1);
        let recognizer = Arc::clone(&self.speech.recognizer);
        let receiver = tokio::spawn(async move {
            recognizer.receive_text(transcript_tx, error_tx).await;
        });

        let reply_ctx = ReplyContext {
            session_id: self.session_id.clone(),
            user: self.user.clone(),
            scenario_key: self.scenario_key.clone(),
            synthesizer: Arc::clone(&self.speech.synthesizer),
            dialogue: Arc::clone(&self.speech.dialogue),
            reply_tx: links.reply_tx.clone(),
            archive_reply_tx: links.archive_reply_tx.clone(),
            cancel: self.cancel.clone(),
        };

        let mut report = OrchestratorReport::default();
        let mut replies: JoinSet<ReplyOutcome> = JoinSet::new();

        // The greeting is the first reply; listening starts once it is done
        let mut state = TurnState::new(TurnPhase::Responding);
        self.phase_tx.send_replace(state.phase());
        // Greeting offset is taken at request time, like every other reply
        replies.spawn(reply_worker(
            reply_ctx.clone(),
            ReplyRequest::Greeting,
            self.started_at.elapsed(),
        ));

        let result: Result<()> = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Orchestrator cancelled for user {}", username);
                    break Ok(());
                }

                frame = links.caller_rx.recv() => {
                    let Some(frame) = frame else {
                        info!("Caller audio queue closed for user {}", username);
                        break Ok(());
                    };
                    report.caller_frames += 1;

                    if state.phase() == TurnPhase::Listening {
                        match self.speech.recognizer.send_audio(&frame).await {
                            Ok(()) => report.frames_recognized += 1,
                            Err(e) => warn!("Failed to send audio to recognition: {:#}", e),
                        }
                    }

                    // The archive worker keeps receiving until this loop has exited
                    if links.archive_caller_tx.send(frame).await.is_err() {
                        debug!("Archive queue closed, caller frame not recorded");
                    }
                }

                event = transcript_rx.recv() => {
                    let Some(event) = event else {
                        info!("Recognition stream ended for user {}", username);
                        break Ok(());
                    };

                    if !event.is_final {
                        debug!("Interim transcript: {}", event.text);
                        continue;
                    }

                    // Offset of the triggering transcript, not of the finished reply
                    let offset = self.started_at.elapsed();
                    match state.accept(&event) {
                        Some(text) => {
                            info!("Final transcript from {} at {}ms: {}", username, offset.as_millis(), text);
                            self.phase_tx.send_replace(state.phase());
                            replies.spawn(reply_worker(
                                reply_ctx.clone(),
                                ReplyRequest::Answer(text),
                                offset,
                            ));
                        }
                        None => {
                            report.ignored_transcripts += 1;
                            debug!("Ignoring final transcript in {:?}: {:?}", state.phase(), event.text);
                        }
                    }
                }

                Some(err) = error_rx.recv() => {
                    error!("Recognition stream error for user {}: {:#}", username, err);
                    break Err(err);
                }

                Some(joined) = replies.join_next(), if !replies.is_empty() => {
                    match joined {
                        Ok(ReplyOutcome::Emitted) => report.replies_emitted += 1,
                        Ok(ReplyOutcome::Failed) => report.failed_turns += 1,
                        Ok(ReplyOutcome::Cancelled) => {}
                        Err(e) => {
                            error!("Reply worker crashed: {}", e);
                            report.failed_turns += 1;
                        }
                    }
                    state.finish_reply();
                    self.phase_tx.send_replace(state.phase());
                    info!("Now listening to user {}", username);
                }
            }
        };

        // Caller audio the read pump queued before the session ended still
        // belongs in the recording
        let mut tail = 0u64;
        while let Ok(frame) = links.caller_rx.try_recv() {
            if links.archive_caller_tx.send(frame).await.is_err() {
                break;
            }
            tail += 1;
        }
        if tail > 0 {
            debug!("Archived {} queued caller frames for user {}", tail, username);
        }
        report.caller_frames += tail;

        // In-flight replies inherit the cancellation; abort whatever remains
        replies.shutdown().await;
        receiver.abort();
        let _ = receiver.await;

        if let Err(e) = self.speech.recognizer.close().await {
            warn!("Error closing recognition stream: {:#}", e);
        }
        if let Err(e) = self.speech.synthesizer.close().await {
            warn!("Error closing synthesizer: {:#}", e);
        }

        let dialogue = Arc::clone(&self.speech.dialogue);
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = dialogue.clear_session(&session_id).await {
                warn!("Failed to clear dialogue session {}: {:#}", session_id, e);
            }
        });

        info!(
            "Orchestrator stopped for user {} ({} frames, {} replies, {} failed turns)",
            username, report.caller_frames, report.replies_emitted, report.failed_turns
        );

        // Dropping `links` closes the reply and archive queues
        drop(links);
        result.map(|()| report)
    }
}

/// Dialogue, then synthesis, then emit to the archive and the write pump
async fn reply_worker(ctx: ReplyContext, request: ReplyRequest, offset: Duration) -> ReplyOutcome {
    let text = tokio::select! {
        _ = ctx.cancel.cancelled() => return ReplyOutcome::Cancelled,
        text = utterance_for(&ctx, &request) => text,
    };

    let text = match text {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("Dialogue returned an empty utterance for {}", ctx.session_id);
            return ReplyOutcome::Failed;
        }
        Err(e) => {
            error!("Dialogue failed for {} ({:?}): {:#}", ctx.session_id, request, e);
            return ReplyOutcome::Failed;
        }
    };

    let audio = tokio::select! {
        _ = ctx.cancel.cancelled() => return ReplyOutcome::Cancelled,
        audio = ctx.synthesizer.synthesize(&text) => audio,
    };

    let audio = match audio {
        Ok(audio) => audio,
        Err(e) => {
            error!("Synthesis failed for {}: {:#}", ctx.session_id, e);
            return ReplyOutcome::Failed;
        }
    };

    let chunk = ArchiveChunk {
        audio: audio.clone(),
        offset,
    };

    let emitted = tokio::select! {
        _ = ctx.cancel.cancelled() => return ReplyOutcome::Cancelled,
        emitted = async {
            if ctx.archive_reply_tx.send(chunk).await.is_err() {
                warn!("Archive queue closed, reply for {} not recorded", ctx.session_id);
            }
            ctx.reply_tx.send(AudioFrame::new(audio)).await
        } => emitted,
    };

    match emitted {
        Ok(()) => ReplyOutcome::Emitted,
        Err(_) => {
            warn!("Reply queue closed before audio could be sent for {}", ctx.session_id);
            ReplyOutcome::Failed
        }
    }
}

async fn utterance_for(ctx: &ReplyContext, request: &ReplyRequest) -> Result<String> {
    match request {
        ReplyRequest::Greeting => {
            let greeting = ctx
                .dialogue
                .init_session(&ctx.session_id, &ctx.scenario_key, &ctx.user.profile)
                .await?;
            info!("Greeting for {}: {}", ctx.user.username, greeting);
            Ok(greeting)
        }
        ReplyRequest::Answer(input) => {
            let reply = ctx.dialogue.chat(&ctx.session_id, input).await?;
            info!(
                "Reply for {} (next step: {}): {}",
                ctx.user.username,
                if reply.next_step.is_empty() { "-" } else { reply.next_step.as_str() },
                reply.utterance
            );
            Ok(reply.utterance)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_transcript_starts_reply() {
        let mut state = TurnState::new(TurnPhase::Listening);
        let accepted = state.accept(&TranscriptEvent::final_text("  hello there "));

        assert_eq!(accepted.as_deref(), Some("hello there"));
        assert_eq!(state.phase(), TurnPhase::Responding);
    }

    #[test]
    fn test_interim_and_empty_are_ignored() {
        let mut state = TurnState::new(TurnPhase::Listening);

        assert!(state.accept(&TranscriptEvent::interim("hel")).is_none());
        assert!(state.accept(&TranscriptEvent::final_text("   ")).is_none());
        assert_eq!(state.phase(), TurnPhase::Listening);
    }

    #[test]
    fn test_duplicate_final_is_ignored() {
        let mut state = TurnState::new(TurnPhase::Listening);
        assert!(state.accept(&TranscriptEvent::final_text("yes")).is_some());
        state.finish_reply();

        assert!(state.accept(&TranscriptEvent::final_text("yes ")).is_none());
        assert_eq!(state.phase(), TurnPhase::Listening);

        assert!(state.accept(&TranscriptEvent::final_text("no")).is_some());
    }

    #[test]
    fn test_finals_while_responding_are_rejected() {
        let mut state = TurnState::new(TurnPhase::Listening);
        assert!(state.accept(&TranscriptEvent::final_text("first")).is_some());

        assert!(state.accept(&TranscriptEvent::final_text("second")).is_none());
        assert_eq!(state.phase(), TurnPhase::Responding);

        // The rejected utterance is not remembered
        state.finish_reply();
        assert!(state.accept(&TranscriptEvent::final_text("second")).is_some());
    }
}
