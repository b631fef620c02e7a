use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

use crate::storage::UserProfile;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub archive: ArchiveConfig,
    pub speech: SpeechConfig,
    pub dialogue: DialogueConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Sizing of the per-session queues between pumps, orchestrator and archiver
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { queue_capacity: 128 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Where base tracks and reply chunks live until the merge runs
    pub temp_dir: PathBuf,
    /// Final recordings land under `{records_root}/{username}/`
    pub records_root: PathBuf,
    pub ffmpeg_path: String,
    /// Container format of the caller's audio as sent by the client (e.g. "webm")
    pub caller_format: String,
    pub reply_sample_rate: u32,
    pub reply_channels: u16,
    pub output_extension: String,
    pub audio_codec: String,
    pub quality: String,
    pub fade_in_ms: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("data/temp_recordings"),
            records_root: PathBuf::from("data/records"),
            ffmpeg_path: "ffmpeg".to_string(),
            caller_format: "webm".to_string(),
            reply_sample_rate: 16000,
            reply_channels: 1,
            output_extension: "mp3".to_string(),
            audio_codec: "libmp3lame".to_string(),
            quality: "4".to_string(),
            fade_in_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    pub nats_url: String,
    pub tts_url: String,
    pub language: String,
    pub voice: String,
    pub sample_rate: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DialogueConfig {
    pub base_url: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub records_file: PathBuf,
}

/// A user known to the service, addressed by an already-issued access token
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub token: String,
    pub username: String,
    pub profile: UserProfile,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_default_capacity() {
        assert_eq!(PipelineConfig::default().queue_capacity, 128);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("service.toml");
        std::fs::write(
            &path,
            r#"
[service]
name = "vishing-sim"
[service.http]
bind = "127.0.0.1"
port = 8080

[archive]
temp_dir = "tmp"
records_root = "records"
ffmpeg_path = "ffmpeg"
caller_format = "webm"
reply_sample_rate = 16000
reply_channels = 1
output_extension = "mp3"
audio_codec = "libmp3lame"
quality = "4"
fade_in_ms = 50

[speech]
nats_url = "nats://localhost:4222"
tts_url = "http://localhost:8002/synthesize"
language = "ko-KR"
voice = "ko-KR-Wavenet-A"
sample_rate = 16000
timeout_secs = 10

[dialogue]
base_url = "http://localhost:8001"
temperature = 0.7
timeout_secs = 10

[storage]
records_file = "records.jsonl"

[[users]]
token = "t-1"
username = "alice"
profile = { name = "Alice", age = 31, gender = "female" }
"#,
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.service.http.port, 8080);
        assert_eq!(cfg.pipeline.queue_capacity, 128);
        assert_eq!(cfg.archive.caller_format, "webm");
        assert_eq!(cfg.users.len(), 1);
        assert_eq!(cfg.users[0].profile.age, 31);
    }
}
