use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Profile forwarded to the dialogue engine so the scenario can be personalised
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub age: u32,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub profile: UserProfile,
}

/// Metadata for one merged conversation recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub username: String,
    pub scenario_key: String,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
}
