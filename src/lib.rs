pub mod archive;
pub mod audio;
pub mod config;
pub mod http;
pub mod scenario;
pub mod session;
pub mod speech;
pub mod storage;
pub mod transport;

pub use archive::{ArchiveChunk, ConversationArchiver, MixPlan};
pub use audio::AudioFrame;
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{ConversationSession, SessionConfig, SessionServices, SessionStats, TurnPhase};
pub use speech::{DialogueEngine, RecognitionStream, SpeechProvider, Synthesizer, TranscriptEvent};
pub use storage::{RecordStore, Recording, User, UserProfile};
