//! Speech and dialogue collaborators consumed by a session
//!
//! The orchestrator only sees the traits defined here. Concrete adapters:
//! - `NatsRecognizer`: streaming recognition over NATS subjects
//! - `HttpSynthesizer`: one HTTP request per utterance
//! - `HttpDialogueEngine`: scenario dialogue service keyed by session id

mod dialogue;
mod messages;
mod nats;
mod synthesis;

use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::storage::UserProfile;

pub use dialogue::HttpDialogueEngine;
pub use messages::{AudioFrameMessage, TranscriptMessage};
pub use nats::{audio_subject, transcript_subject, NatsRecognizer, NatsSpeechProvider};
pub use synthesis::HttpSynthesizer;

/// A recognition result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Reply produced by the dialogue engine for one caller utterance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DialogueReply {
    pub utterance: String,
    #[serde(default)]
    pub next_step: String,
}

/// Streaming speech recognition for one session
#[async_trait::async_trait]
pub trait RecognitionStream: Send + Sync {
    async fn send_audio(&self, frame: &AudioFrame) -> Result<()>;

    /// Push transcript events into `results` until the stream ends
    ///
    /// Runs as its own task for the lifetime of the session. Unrecoverable
    /// stream faults go to `errors`.
    async fn receive_text(
        &self,
        results: mpsc::Sender<TranscriptEvent>,
        errors: mpsc::Sender<anyhow::Error>,
    );

    async fn close(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    /// Convert one utterance into reply audio
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Scenario dialogue; all conversation state lives on the engine side
#[async_trait::async_trait]
pub trait DialogueEngine: Send + Sync {
    /// Start a session and return the opening line
    async fn init_session(
        &self,
        session_id: &str,
        scenario_key: &str,
        profile: &UserProfile,
    ) -> Result<String>;

    async fn chat(&self, session_id: &str, text: &str) -> Result<DialogueReply>;

    async fn clear_session(&self, session_id: &str) -> Result<()>;
}

/// Builds the per-session speech collaborators
#[async_trait::async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn open_recognizer(&self, session_id: &str) -> Result<Arc<dyn RecognitionStream>>;

    async fn open_synthesizer(&self) -> Result<Arc<dyn Synthesizer>>;
}
