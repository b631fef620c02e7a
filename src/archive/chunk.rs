use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::warn;

use crate::audio::pcm16_le_samples;

/// Metadata for one synthesized reply saved to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Reply number within the session (1-based, creation order)
    pub index: u64,
    pub file_path: PathBuf,
    /// Offset from session start of the transcript that triggered the reply
    pub start_ms: u64,
    pub sample_count: usize,
}

/// Writes a single reply chunk as a 16-bit PCM WAV file
pub(crate) struct ReplyChunkWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: ChunkMetadata,
}

impl ReplyChunkWriter {
    pub(crate) fn create(
        file_path: PathBuf,
        index: u64,
        start_ms: u64,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            metadata: ChunkMetadata {
                index,
                file_path,
                start_ms,
                sample_count: 0,
            },
        })
    }

    pub(crate) fn write_pcm(&mut self, pcm: &[u8]) -> Result<()> {
        let (samples, truncated) = pcm16_le_samples(pcm);
        if truncated {
            warn!(
                "Reply chunk {} has an odd byte count, dropping the trailing byte",
                self.metadata.index
            );
        }

        if let Some(writer) = &mut self.writer {
            for &sample in &samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.metadata.sample_count += samples.len();
        }

        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<ChunkMetadata> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        Ok(self.metadata.clone())
    }
}

impl Drop for ReplyChunkWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reply_chunk_round_trip_samples() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("reply.wav");

        let mut writer = ReplyChunkWriter::create(path.clone(), 1, 1500, 16000, 1)?;
        let pcm: Vec<u8> = [100i16, -200, 300]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        writer.write_pcm(&pcm)?;
        let meta = writer.finish()?;

        assert_eq!(meta.sample_count, 3);
        assert_eq!(meta.start_ms, 1500);

        let reader = hound::WavReader::open(&path)?;
        assert_eq!(reader.spec().sample_rate, 16000);
        let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
        assert_eq!(samples, vec![100, -200, 300]);
        Ok(())
    }
}
