use super::config::SessionConfig;
use super::orchestrator::{Orchestrator, OrchestratorLinks, OrchestratorReport, SpeechHandles, TurnPhase};
use super::stats::SessionStats;
use crate::archive::{run_archiver, ConversationArchiver};
use crate::speech::{DialogueEngine, RecognitionStream, SpeechProvider, Synthesizer};
use crate::storage::{RecordStore, Recording, User};
use crate::transport::{read_pump, write_pump, FrameReader, FrameWriter};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Collaborators shared by every session on the server
#[derive(Clone)]
pub struct SessionServices {
    pub speech: Arc<dyn SpeechProvider>,
    pub dialogue: Arc<dyn DialogueEngine>,
    pub records: Arc<dyn RecordStore>,
}

/// One live audio conversation: four workers over one connection, then a merge
pub struct ConversationSession {
    /// Session identifier, also the dialogue engine's session key
    id: String,

    user: User,

    scenario_key: String,

    config: SessionConfig,

    /// Reference point for every reply offset
    started_at: Instant,

    created_at: chrono::DateTime<Utc>,

    /// Cancelled by whichever worker exits first
    cancel: CancellationToken,

    phase_tx: watch::Sender<TurnPhase>,
}

impl ConversationSession {
    /// Create a session whose cancellation is scoped under `parent`
    pub fn new(
        user: User,
        scenario_key: impl Into<String>,
        config: SessionConfig,
        parent: &CancellationToken,
    ) -> Self {
        let (phase_tx, _) = watch::channel(TurnPhase::Responding);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            scenario_key: scenario_key.into(),
            config,
            started_at: Instant::now(),
            created_at: Utc::now(),
            cancel: parent.child_token(),
            phase_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Observe turn-taking transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<TurnPhase> {
        self.phase_tx.subscribe()
    }

    /// `{records_root}/{username}/{session_id}.{ext}`
    pub fn recording_path(&self) -> PathBuf {
        self.config
            .archive
            .records_root
            .join(&self.user.username)
            .join(format!("{}.{}", self.id, self.config.archive.output_extension))
    }

    /// Run the session to completion
    ///
    /// Collaborator setup failures abort before any worker starts. Once the
    /// workers run, the session ends when any of them exits; all four are
    /// joined before the archive is merged.
    pub async fn run<R, W>(self, reader: R, writer: W, services: &SessionServices) -> Result<SessionStats>
    where
        R: FrameReader + 'static,
        W: FrameWriter + 'static,
    {
        let username = self.user.username.clone();
        info!(
            "Audio session {} started for user {} (scenario: {})",
            self.id, username, self.scenario_key
        );

        let (recognizer, synthesizer) = open_speech(services.speech.as_ref(), &self.id).await?;
        let archiver = match ConversationArchiver::new(&self.id, self.config.archive.clone()) {
            Ok(archiver) => archiver,
            Err(e) => {
                close_speech(&recognizer, &synthesizer).await;
                return Err(e.context("Failed to create archiver"));
            }
        };

        let capacity = self.config.queue_capacity;
        let (caller_tx, caller_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);
        let (archive_caller_tx, archive_caller_rx) = mpsc::channel(capacity);
        let (archive_reply_tx, archive_reply_rx) = mpsc::channel(capacity);

        // Client -> server
        let read_handle = {
            let guard = self.cancel.clone().drop_guard();
            let cancel = self.cancel.clone();
            let username = username.clone();
            tokio::spawn(async move {
                let _guard = guard;
                read_pump(reader, &username, caller_tx, cancel).await
            })
        };

        // Server -> client
        let write_handle = {
            let guard = self.cancel.clone().drop_guard();
            let cancel = self.cancel.clone();
            let username = username.clone();
            tokio::spawn(async move {
                let _guard = guard;
                write_pump(writer, &username, reply_rx, cancel).await
            })
        };

        // Recognition, dialogue, synthesis
        let orchestrator_handle = {
            let guard = self.cancel.clone().drop_guard();
            let orchestrator = Orchestrator::new(
                self.id.clone(),
                self.user.clone(),
                self.scenario_key.clone(),
                self.started_at,
                SpeechHandles {
                    recognizer,
                    synthesizer,
                    dialogue: Arc::clone(&services.dialogue),
                },
                self.cancel.clone(),
                self.phase_tx.clone(),
            );
            let links = OrchestratorLinks {
                caller_rx,
                reply_tx,
                archive_caller_tx,
                archive_reply_tx,
            };
            tokio::spawn(async move {
                let _guard = guard;
                orchestrator.run(links).await
            })
        };

        let archive_handle = {
            let guard = self.cancel.clone().drop_guard();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let _guard = guard;
                run_archiver(archiver, archive_caller_rx, archive_reply_rx, cancel).await
            })
        };

        let (read_result, write_result, orchestrator_result, archive_result) =
            tokio::join!(read_handle, write_handle, orchestrator_handle, archive_handle);

        let duration_secs = self.started_at.elapsed().as_secs_f64();
        info!("Audio session {} ended for user {}, archiving", self.id, username);

        match read_result {
            Ok(Ok(frames)) => info!("Read pump forwarded {} frames", frames),
            Ok(Err(e)) => warn!("Read pump failed: {:#}", e),
            Err(e) => error!("Read pump panicked: {}", e),
        }
        match write_result {
            Ok(Ok(frames)) => info!("Write pump sent {} frames", frames),
            Ok(Err(e)) => warn!("Write pump failed: {:#}", e),
            Err(e) => error!("Write pump panicked: {}", e),
        }

        let mut fatal = None;
        let report = match orchestrator_result {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!("Session {} ended by fault: {:#}", self.id, e);
                fatal = Some(format!("{:#}", e));
                OrchestratorReport::default()
            }
            Err(e) => {
                error!("Orchestrator panicked: {}", e);
                fatal = Some(e.to_string());
                OrchestratorReport::default()
            }
        };

        let archiver = archive_result.context("Archive worker panicked")?;
        let caller_frames = archiver.caller_frames();
        let replies = archiver.chunks().len() as u64;

        let recording_path = self.save_recording(archiver, services.records.as_ref()).await;

        Ok(SessionStats {
            session_id: self.id.clone(),
            username,
            scenario_key: self.scenario_key.clone(),
            started_at: self.created_at,
            duration_secs,
            caller_frames,
            frames_recognized: report.frames_recognized,
            replies,
            failed_turns: report.failed_turns,
            recording_path,
            error: fatal,
        })
    }

    /// Merge the archive and persist its metadata; `None` when the merge failed
    async fn save_recording(
        &self,
        archiver: ConversationArchiver,
        records: &dyn RecordStore,
    ) -> Option<PathBuf> {
        let path = self.recording_path();

        if let Err(e) = archiver.merge_and_save(&path).await {
            error!("Failed to merge audio for session {}: {:#}", self.id, e);
            return None;
        }

        let recording = Recording {
            username: self.user.username.clone(),
            scenario_key: self.scenario_key.clone(),
            file_path: path.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = records.create(recording).await {
            error!("Failed to save recording metadata for {}: {:#}", self.id, e);
        } else {
            info!(
                "Saved recording for user {}: {}",
                self.user.username,
                path.display()
            );
        }

        Some(path)
    }
}

/// Open recognition then synthesis; on a synthesis failure the recognizer is closed again
async fn open_speech(
    provider: &dyn SpeechProvider,
    session_id: &str,
) -> Result<(Arc<dyn RecognitionStream>, Arc<dyn Synthesizer>)> {
    let recognizer = provider
        .open_recognizer(session_id)
        .await
        .context("Failed to create recognition stream")?;

    let synthesizer = match provider.open_synthesizer().await {
        Ok(synthesizer) => synthesizer,
        Err(e) => {
            if let Err(close_err) = recognizer.close().await {
                warn!("Error closing recognition stream: {:#}", close_err);
            }
            return Err(e.context("Failed to create synthesizer"));
        }
    };

    Ok((recognizer, synthesizer))
}

async fn close_speech(recognizer: &Arc<dyn RecognitionStream>, synthesizer: &Arc<dyn Synthesizer>) {
    if let Err(e) = recognizer.close().await {
        warn!("Error closing recognition stream: {:#}", e);
    }
    if let Err(e) = synthesizer.close().await {
        warn!("Error closing synthesizer: {:#}", e);
    }
}
