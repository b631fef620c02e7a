use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Summary of a finished conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub username: String,

    pub scenario_key: String,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Wall-clock length of the live conversation in seconds
    pub duration_secs: f64,

    /// Caller frames recorded to the base track
    pub caller_frames: u64,

    /// Caller frames forwarded to recognition (only while listening)
    pub frames_recognized: u64,

    /// Reply chunks recorded, greeting included
    pub replies: u64,

    /// Turns aborted by a dialogue or synthesis failure
    pub failed_turns: u64,

    /// Merged recording, present only when the merge succeeded
    pub recording_path: Option<PathBuf>,

    /// Fatal fault that ended the session, if any
    pub error: Option<String>,
}
