use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::chunk::{ChunkMetadata, ReplyChunkWriter};
use super::mix::{run_ffmpeg, EncoderSettings, MixPlan};
use crate::audio::AudioFrame;
use crate::config::ArchiveConfig;

/// Synthesized reply audio tagged with the offset of its triggering transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveChunk {
    pub audio: Vec<u8>,
    pub offset: Duration,
}

/// Per-session recorder for both legs of the conversation
///
/// Caller audio is appended to one continuous base track; each reply is its
/// own WAV file. `merge_and_save` mixes them into the final recording and
/// always removes the temporary files.
pub struct ConversationArchiver {
    session_id: String,
    config: ArchiveConfig,
    base_track: Option<BufWriter<File>>,
    base_track_path: PathBuf,
    base_track_closes: u32,
    caller_frames: u64,
    caller_bytes: u64,
    chunks: Vec<ChunkMetadata>,
    chunk_counter: u64,
}

impl ConversationArchiver {
    pub fn new(session_id: &str, config: ArchiveConfig) -> Result<Self> {
        fs::create_dir_all(&config.temp_dir)
            .with_context(|| format!("Failed to create temp directory: {:?}", config.temp_dir))?;

        let base_track_path = config
            .temp_dir
            .join(format!("{}_caller.{}", session_id, config.caller_format));
        let file = File::create(&base_track_path)
            .with_context(|| format!("Failed to create base track: {:?}", base_track_path))?;

        info!(
            "Archiver initialized for session {}: {}",
            session_id,
            base_track_path.display()
        );

        Ok(Self {
            session_id: session_id.to_string(),
            config,
            base_track: Some(BufWriter::new(file)),
            base_track_path,
            base_track_closes: 0,
            caller_frames: 0,
            caller_bytes: 0,
            chunks: Vec::new(),
            chunk_counter: 0,
        })
    }

    /// Append caller audio to the base track; failures are logged and skipped
    pub fn write_caller(&mut self, frame: &AudioFrame) {
        let Some(base) = &mut self.base_track else {
            warn!("Base track for {} already closed, dropping caller frame", self.session_id);
            return;
        };

        if let Err(e) = base.write_all(frame.as_bytes()) {
            error!("Failed to write caller frame for {}: {}", self.session_id, e);
            return;
        }

        self.caller_frames += 1;
        self.caller_bytes += frame.len() as u64;
    }

    /// Save one reply as its own chunk file; failures are logged and skipped
    ///
    /// The WAV encoding runs on the blocking pool.
    pub async fn write_reply(&mut self, chunk: ArchiveChunk) {
        self.chunk_counter += 1;
        let index = self.chunk_counter;
        let start_ms = chunk.offset.as_millis() as u64;
        let path = self
            .config
            .temp_dir
            .join(format!("{}_reply_{}.wav", self.session_id, index));

        let sample_rate = self.config.reply_sample_rate;
        let channels = self.config.reply_channels;
        let chunk_path = path.clone();
        let written = tokio::task::spawn_blocking(move || {
            let mut writer =
                ReplyChunkWriter::create(chunk_path, index, start_ms, sample_rate, channels)?;
            writer.write_pcm(&chunk.audio)?;
            writer.finish()
        })
        .await
        .context("Reply chunk writer panicked")
        .and_then(|written| written);

        match written {
            Ok(metadata) => {
                info!(
                    "Saved reply chunk {} for {} (start: {}ms, {} samples)",
                    index, self.session_id, start_ms, metadata.sample_count
                );
                self.chunks.push(metadata);
            }
            Err(e) => {
                error!("Failed to save reply chunk {} for {}: {:#}", index, self.session_id, e);
                // A half-written file is still a temp file of this session
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to delete partial chunk {}: {}", path.display(), e);
                    }
                }
            }
        }
    }

    /// Flush and close the base track. Later calls are no-ops.
    pub fn close_base_track(&mut self) {
        if let Some(mut base) = self.base_track.take() {
            if let Err(e) = base.flush() {
                error!("Failed to flush base track for {}: {}", self.session_id, e);
            }
            self.base_track_closes += 1;
            debug!("Base track closed for {}", self.session_id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.base_track.is_none()
    }

    /// How many times the base track was actually closed (0 or 1)
    pub fn close_count(&self) -> u32 {
        self.base_track_closes
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn base_track_path(&self) -> &Path {
        &self.base_track_path
    }

    pub fn caller_frames(&self) -> u64 {
        self.caller_frames
    }

    pub fn caller_bytes(&self) -> u64 {
        self.caller_bytes
    }

    pub fn chunks(&self) -> &[ChunkMetadata] {
        &self.chunks
    }

    /// Every temporary file owned by this session
    pub fn temp_files(&self) -> Vec<PathBuf> {
        std::iter::once(self.base_track_path.clone())
            .chain(self.chunks.iter().map(|c| c.file_path.clone()))
            .collect()
    }

    pub fn mix_plan(&self) -> MixPlan {
        let mut plan = MixPlan::new(&self.base_track_path)
            .base_format(self.config.caller_format.clone())
            .fade_in_ms(self.config.fade_in_ms);
        for chunk in &self.chunks {
            plan.add_reply(&chunk.file_path, chunk.start_ms);
        }
        plan
    }

    /// Mix base track and replies into `output`, then delete all temp files
    ///
    /// Temp files are removed whether or not the merge succeeded. No retry.
    pub async fn merge_and_save(mut self, output: &Path) -> Result<()> {
        self.close_base_track();

        info!(
            "Merging {} reply chunks for session {} into {}",
            self.chunks.len(),
            self.session_id,
            output.display()
        );

        let result = self.merge(output).await;
        match &result {
            Ok(()) => info!("Merge successful for {}", self.session_id),
            Err(e) => error!("Merge failed for {}: {:#}", self.session_id, e),
        }

        self.remove_temp_files();
        result
    }

    async fn merge(&self, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create record directory: {:?}", parent))?;
        }

        let encoder = EncoderSettings {
            codec: self.config.audio_codec.clone(),
            quality: self.config.quality.clone(),
        };
        run_ffmpeg(&self.config.ffmpeg_path, &self.mix_plan(), &encoder, output).await
    }

    fn remove_temp_files(&self) {
        for path in self.temp_files() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to delete temp file {}: {}", path.display(), e);
                }
            }
        }
        info!("Temp files deleted for {}", self.session_id);
    }
}

/// Archive worker: record caller frames and replies until both queues close
///
/// Cancellation does not stop the worker. The orchestrator closes both
/// queues on its way out, after forwarding caller audio that was still
/// queued, so recording continues until then and nothing sent is lost. The
/// base track is closed before the archiver is handed back for merging.
pub async fn run_archiver(
    mut archiver: ConversationArchiver,
    mut caller_rx: mpsc::Receiver<AudioFrame>,
    mut reply_rx: mpsc::Receiver<ArchiveChunk>,
    cancel: CancellationToken,
) -> ConversationArchiver {
    info!("Archive worker started for session {}", archiver.session_id());

    let mut caller_open = true;
    let mut reply_open = true;
    let mut draining = false;

    while caller_open || reply_open {
        tokio::select! {
            _ = cancel.cancelled(), if !draining => {
                info!(
                    "Session {} cancelled, archiving until upstream queues close",
                    archiver.session_id()
                );
                draining = true;
            }
            frame = caller_rx.recv(), if caller_open => match frame {
                Some(frame) => archiver.write_caller(&frame),
                None => caller_open = false,
            },
            chunk = reply_rx.recv(), if reply_open => match chunk {
                Some(chunk) => archiver.write_reply(chunk).await,
                None => reply_open = false,
            },
        }
    }

    archiver.close_base_track();
    info!(
        "Archive worker stopped for session {} ({} caller frames, {} replies)",
        archiver.session_id(),
        archiver.caller_frames(),
        archiver.chunks().len()
    );
    archiver
}
