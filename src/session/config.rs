use crate::config::{ArchiveConfig, Config};

/// Configuration for one conversation session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of every queue between pumps, orchestrator and archiver
    /// Default: 128 entries
    pub queue_capacity: usize,

    /// Temp layout, merge tool, and final record location
    pub archive: ArchiveConfig,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_capacity: config.pipeline.queue_capacity.max(1),
            archive: config.archive.clone(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 128,
            archive: ArchiveConfig::default(),
        }
    }
}
