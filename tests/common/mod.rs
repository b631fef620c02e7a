// Shared fakes for the session integration tests
//
// Every collaborator a session talks to is replaced by an in-memory double
// that records what it was asked to do.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};

use vishing_sim::audio::AudioFrame;
use vishing_sim::config::ArchiveConfig;
use vishing_sim::session::TurnPhase;
use vishing_sim::speech::{
    DialogueEngine, DialogueReply, RecognitionStream, SpeechProvider, Synthesizer, TranscriptEvent,
};
use vishing_sim::storage::{RecordStore, Recording, User, UserProfile};
use vishing_sim::transport::{Frame, FrameReader, FrameWriter};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn test_user() -> User {
    User {
        username: "alice".to_string(),
        profile: UserProfile {
            name: "Alice".to_string(),
            age: 67,
            gender: "female".to_string(),
        },
    }
}

pub fn archive_config(root: &Path, ffmpeg_path: &str) -> ArchiveConfig {
    ArchiveConfig {
        temp_dir: root.join("temp"),
        records_root: root.join("records"),
        ffmpeg_path: ffmpeg_path.to_string(),
        ..ArchiveConfig::default()
    }
}

/// Poll `check` until it holds or the wait budget runs out
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub async fn wait_for_phase(rx: &mut watch::Receiver<TurnPhase>, phase: TurnPhase) {
    tokio::time::timeout(WAIT, rx.wait_for(|p| *p == phase))
        .await
        .expect("timed out waiting for phase")
        .expect("phase channel closed");
}

pub async fn recv<T>(rx: &mut mpsc::Receiver<T>) -> Option<T> {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for queue item")
}

// ============================================================================
// Transport
// ============================================================================

/// Frames pushed through `ClientHandle::send` arrive here
pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait::async_trait]
impl FrameReader for ChannelReader {
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.rx.recv().await)
    }
}

pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<Frame>,
    closes: Arc<AtomicU32>,
    fail_writes: bool,
}

#[async_trait::async_trait]
impl FrameWriter for ChannelWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        if self.fail_writes {
            bail!("connection reset by peer");
        }
        self.tx
            .send(frame)
            .map_err(|_| anyhow!("client output dropped"))
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The test's side of a fake connection
pub struct ClientHandle {
    pub inbound: mpsc::UnboundedSender<Frame>,
    pub outbound: mpsc::UnboundedReceiver<Frame>,
    pub closes: Arc<AtomicU32>,
}

impl ClientHandle {
    pub fn send(&self, frame: Frame) {
        self.inbound.send(frame).expect("reader dropped");
    }

    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for outbound frame")
    }
}

pub fn connection() -> (ChannelReader, ChannelWriter, ClientHandle) {
    connection_with(false)
}

pub fn failing_connection() -> (ChannelReader, ChannelWriter, ClientHandle) {
    connection_with(true)
}

fn connection_with(fail_writes: bool) -> (ChannelReader, ChannelWriter, ClientHandle) {
    let (inbound, rx) = mpsc::unbounded_channel();
    let (tx, outbound) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicU32::new(0));

    (
        ChannelReader { rx },
        ChannelWriter {
            tx,
            closes: closes.clone(),
            fail_writes,
        },
        ClientHandle {
            inbound,
            outbound,
            closes,
        },
    )
}

// ============================================================================
// Speech
// ============================================================================

/// Test-side controls for a `MockRecognizer`
pub struct RecognizerControl {
    pub transcripts: mpsc::UnboundedSender<TranscriptEvent>,
    pub errors: mpsc::UnboundedSender<anyhow::Error>,
}

impl RecognizerControl {
    pub fn say(&self, event: TranscriptEvent) {
        self.transcripts.send(event).expect("recognizer gone");
    }
}

pub struct MockRecognizer {
    frames: StdMutex<Vec<Vec<u8>>>,
    transcripts: Mutex<Option<mpsc::UnboundedReceiver<TranscriptEvent>>>,
    errors: Mutex<Option<mpsc::UnboundedReceiver<anyhow::Error>>>,
    closes: AtomicU32,
}

impl MockRecognizer {
    pub fn new() -> (Arc<Self>, RecognizerControl) {
        let (transcripts_tx, transcripts_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let recognizer = Arc::new(Self {
            frames: StdMutex::new(Vec::new()),
            transcripts: Mutex::new(Some(transcripts_rx)),
            errors: Mutex::new(Some(errors_rx)),
            closes: AtomicU32::new(0),
        });

        (
            recognizer,
            RecognizerControl {
                transcripts: transcripts_tx,
                errors: errors_tx,
            },
        )
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RecognitionStream for MockRecognizer {
    async fn send_audio(&self, frame: &AudioFrame) -> Result<()> {
        self.frames.lock().unwrap().push(frame.as_bytes().to_vec());
        Ok(())
    }

    async fn receive_text(
        &self,
        results: mpsc::Sender<TranscriptEvent>,
        errors: mpsc::Sender<anyhow::Error>,
    ) {
        let Some(mut transcripts) = self.transcripts.lock().await.take() else {
            return;
        };
        let Some(mut faults) = self.errors.lock().await.take() else {
            return;
        };

        loop {
            tokio::select! {
                event = transcripts.recv() => match event {
                    Some(event) => {
                        if results.send(event).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                },
                Some(err) = faults.recv() => {
                    let _ = errors.send(err).await;
                    return;
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Synthesizes an utterance as its UTF-8 bytes padded to whole samples
pub struct MockSynthesizer {
    fail_on: Option<String>,
    calls: AtomicU32,
    closes: AtomicU32,
}

impl MockSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_on: None,
            calls: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        })
    }

    pub fn failing_on(text: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(text.to_string()),
            calls: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        })
    }

    pub fn audio_for(text: &str) -> Vec<u8> {
        let mut audio = text.as_bytes().to_vec();
        if audio.len() % 2 == 1 {
            audio.push(0);
        }
        audio
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(text) {
            bail!("synthesis quota exceeded");
        }
        Ok(Self::audio_for(text))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub const GREETING: &str = "Hello, this is the fraud prevention team at your bank.";

pub fn reply_to(text: &str) -> String {
    format!("reply to {}", text)
}

/// Scripted dialogue engine; `chat` can be held at a gate until released
pub struct MockDialogue {
    gate: Option<Semaphore>,
    fail_on: Option<String>,
    fail_init: bool,
    chats: StdMutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    clears: AtomicU32,
}

impl MockDialogue {
    fn build(gate: Option<Semaphore>, fail_on: Option<&str>, fail_init: bool) -> Arc<Self> {
        Arc::new(Self {
            gate,
            fail_on: fail_on.map(str::to_string),
            fail_init,
            chats: StdMutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            clears: AtomicU32::new(0),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::build(None, None, false)
    }

    pub fn gated() -> Arc<Self> {
        Self::build(Some(Semaphore::new(0)), None, false)
    }

    pub fn gated_failing_on(text: &str) -> Arc<Self> {
        Self::build(Some(Semaphore::new(0)), Some(text), false)
    }

    pub fn failing_on(text: &str) -> Arc<Self> {
        Self::build(None, Some(text), false)
    }

    pub fn failing_init() -> Arc<Self> {
        Self::build(None, None, true)
    }

    /// Let `n` gated chat calls through
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn chats(&self) -> Vec<String> {
        self.chats.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> u32 {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DialogueEngine for MockDialogue {
    async fn init_session(
        &self,
        _session_id: &str,
        _scenario_key: &str,
        _profile: &UserProfile,
    ) -> Result<String> {
        if self.fail_init {
            bail!("dialogue service unavailable");
        }
        Ok(GREETING.to_string())
    }

    async fn chat(&self, _session_id: &str, text: &str) -> Result<DialogueReply> {
        self.chats.lock().unwrap().push(text.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(text) {
            bail!("dialogue model timed out");
        }

        Ok(DialogueReply {
            utterance: reply_to(text),
            next_step: "verify_identity".to_string(),
        })
    }

    async fn clear_session(&self, _session_id: &str) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockSpeechProvider {
    pub recognizer: Arc<MockRecognizer>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub fail_synthesizer: bool,
}

#[async_trait::async_trait]
impl SpeechProvider for MockSpeechProvider {
    async fn open_recognizer(&self, _session_id: &str) -> Result<Arc<dyn RecognitionStream>> {
        Ok(self.recognizer.clone())
    }

    async fn open_synthesizer(&self) -> Result<Arc<dyn Synthesizer>> {
        if self.fail_synthesizer {
            bail!("synthesis credentials rejected");
        }
        Ok(self.synthesizer.clone())
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Default)]
pub struct MemoryRecordStore {
    records: StdMutex<Vec<Recording>>,
}

impl MemoryRecordStore {
    pub fn records(&self) -> Vec<Recording> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, recording: Recording) -> Result<()> {
        self.records.lock().unwrap().push(recording);
        Ok(())
    }

    async fn list_for_user(&self, username: &str) -> Result<Vec<Recording>> {
        Ok(self
            .records()
            .into_iter()
            .filter(|r| r.username == username)
            .rev()
            .collect())
    }
}
