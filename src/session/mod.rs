//! Conversation session management
//!
//! This module provides the `ConversationSession` abstraction that manages:
//! - The read and write pumps on the live connection
//! - The turn-taking orchestrator (recognition, dialogue, synthesis)
//! - The archive worker and the final merge into one recording
//! - The text-only session flavor

mod config;
pub mod orchestrator;
mod session;
mod stats;
mod text;

pub use config::SessionConfig;
pub use orchestrator::{Orchestrator, OrchestratorLinks, OrchestratorReport, SpeechHandles, TurnPhase};
pub use session::{ConversationSession, SessionServices};
pub use stats::SessionStats;
pub use text::run_text_session;
