use anyhow::{anyhow, Context, Result};
use async_nats::{Client, Subscriber};
use base64::Engine;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::messages::{AudioFrameMessage, TranscriptMessage};
use super::{RecognitionStream, SpeechProvider, Synthesizer, TranscriptEvent};
use super::HttpSynthesizer;
use crate::audio::AudioFrame;
use crate::config::SpeechConfig;

/// Subject caller audio for one session is published on
pub fn audio_subject(session_id: &str) -> String {
    format!("audio.frame.session-{}", session_id)
}

/// Partial and final results for one session arrive on
/// `stt.text.partial.session-{id}` and `stt.text.final.session-{id}`
pub fn transcript_subject(session_id: &str) -> String {
    format!("stt.text.*.session-{}", session_id)
}

/// Recognition stream for one session backed by NATS pub/sub
pub struct NatsRecognizer {
    client: Client,
    session_id: String,
    sample_rate: u32,
    sequence: AtomicU32,
    subscriber: Mutex<Option<Subscriber>>,
}

impl NatsRecognizer {
    /// Subscribe to transcripts before any audio is published so no early
    /// result can be missed
    pub async fn open(client: Client, session_id: String, sample_rate: u32) -> Result<Self> {
        let subject = transcript_subject(&session_id);
        info!("Subscribing to transcripts on {}", subject);

        let subscriber = client
            .subscribe(subject)
            .await
            .context("Failed to subscribe to transcripts")?;

        Ok(Self {
            client,
            session_id,
            sample_rate,
            sequence: AtomicU32::new(0),
            subscriber: Mutex::new(Some(subscriber)),
        })
    }

    async fn publish(&self, pcm_bytes: &[u8], is_final: bool) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let message = AudioFrameMessage {
            session_id: self.session_id.clone(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate: self.sample_rate,
            channels: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(audio_subject(&self.session_id), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame for {} (seq={}, bytes={}, final={})",
            self.session_id,
            sequence,
            pcm_bytes.len(),
            is_final
        );

        Ok(())
    }
}

#[async_trait::async_trait]
impl RecognitionStream for NatsRecognizer {
    async fn send_audio(&self, frame: &AudioFrame) -> Result<()> {
        self.publish(frame.as_bytes(), false).await
    }

    async fn receive_text(
        &self,
        results: mpsc::Sender<TranscriptEvent>,
        errors: mpsc::Sender<anyhow::Error>,
    ) {
        let Some(mut subscriber) = self.subscriber.lock().await.take() else {
            let _ = errors
                .send(anyhow!("Transcript stream for {} already consumed", self.session_id))
                .await;
            return;
        };

        info!("Transcript receiver started for {}", self.session_id);

        while let Some(msg) = subscriber.next().await {
            let transcript = match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                Ok(transcript) => transcript,
                Err(e) => {
                    warn!("Failed to parse transcript message: {}", e);
                    continue;
                }
            };

            if transcript.session_id != self.session_id {
                warn!(
                    "Dropping transcript for {} delivered on {}",
                    transcript.session_id, msg.subject
                );
                continue;
            }

            if let Some(err) = transcript.error {
                let _ = errors.send(anyhow!("Recognition stream error: {}", err)).await;
                break;
            }

            debug!(
                "Transcript for {} (partial={}): {}",
                self.session_id, transcript.partial, transcript.text
            );

            let event = TranscriptEvent {
                text: transcript.text,
                is_final: !transcript.partial,
            };
            if results.send(event).await.is_err() {
                break;
            }
        }

        info!("Transcript receiver stopped for {}", self.session_id);
    }

    async fn close(&self) -> Result<()> {
        // Final marker tells the recognizer to flush and drop its stream state
        self.publish(&[], true).await?;
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }
}

/// Production speech stack: NATS recognition plus HTTP synthesis
pub struct NatsSpeechProvider {
    client: Client,
    config: SpeechConfig,
}

impl NatsSpeechProvider {
    pub async fn connect(config: SpeechConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.nats_url);

        let client = async_nats::connect(&config.nats_url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl SpeechProvider for NatsSpeechProvider {
    async fn open_recognizer(&self, session_id: &str) -> Result<Arc<dyn RecognitionStream>> {
        let recognizer = NatsRecognizer::open(
            self.client.clone(),
            session_id.to_string(),
            self.config.sample_rate,
        )
        .await?;
        Ok(Arc::new(recognizer))
    }

    async fn open_synthesizer(&self) -> Result<Arc<dyn Synthesizer>> {
        Ok(Arc::new(HttpSynthesizer::new(&self.config)?))
    }
}
