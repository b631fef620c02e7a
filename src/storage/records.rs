use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::models::Recording;

/// Storage for recording metadata
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist metadata for a merged recording
    async fn create(&self, recording: Recording) -> Result<()>;

    /// List a user's recordings, newest first
    async fn list_for_user(&self, username: &str) -> Result<Vec<Recording>>;
}

/// Append-only JSON-lines file, one `Recording` per line
pub struct JsonlRecordStore {
    path: PathBuf,
    // Serialises appends so concurrent sessions never interleave lines
    write_lock: Mutex<()>,
}

impl JsonlRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for JsonlRecordStore {
    async fn create(&self, recording: Recording) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create record store directory")?;
            }
        }

        let mut line = serde_json::to_vec(&recording)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open record store: {:?}", self.path))?;
        file.write_all(&line)
            .await
            .context("Failed to append recording")?;
        file.flush().await?;

        info!(
            "Saved recording metadata for {}: {}",
            recording.username,
            recording.file_path.display()
        );

        Ok(())
    }

    async fn list_for_user(&self, username: &str) -> Result<Vec<Recording>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read record store: {:?}", self.path))
            }
        };

        let mut records: Vec<Recording> = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<Recording>(line) {
                Ok(record) if record.username == username => records.push(record),
                Ok(_) => {}
                Err(e) => warn!("Skipping malformed record line: {}", e),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
