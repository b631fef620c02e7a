// Offline mix of a session's caller track with its timestamped replies
//
// `MixPlan` collects the ordered inputs, `MixGraph` is the tool-neutral
// description of the filter pipeline (one delayed stream per reply, then a
// single mix), and the ffmpeg rendering lives at the bottom of this file.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Output encoding for the merged recording
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub codec: String,
    pub quality: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixInput {
    pub source: PathBuf,
    pub delay_ms: u64,
}

/// Ordered inputs for one merge: the caller track first, then every reply in
/// creation order
#[derive(Debug, Clone)]
pub struct MixPlan {
    base: PathBuf,
    base_format: Option<String>,
    replies: Vec<MixInput>,
    fade_in_ms: u64,
}

/// A reply input shifted to its offset, with a fade-in applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedStream {
    pub input_index: usize,
    pub delay_ms: u64,
    pub fade_in_ms: u64,
    pub label: String,
}

/// Tool-neutral filter pipeline: delay each reply, then mix everything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixGraph {
    pub delayed: Vec<DelayedStream>,
    pub mix_inputs: usize,
    pub output_label: String,
}

const OUTPUT_LABEL: &str = "final_mix";

impl MixPlan {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            base_format: None,
            replies: Vec::new(),
            fade_in_ms: 0,
        }
    }

    /// Container format of the base track when it cannot be probed from the file name
    pub fn base_format(mut self, format: impl Into<String>) -> Self {
        self.base_format = Some(format.into());
        self
    }

    pub fn fade_in_ms(mut self, fade_in_ms: u64) -> Self {
        self.fade_in_ms = fade_in_ms;
        self
    }

    pub fn add_reply(&mut self, source: impl Into<PathBuf>, delay_ms: u64) {
        self.replies.push(MixInput {
            source: source.into(),
            delay_ms,
        });
    }

    pub fn replies(&self) -> &[MixInput] {
        &self.replies
    }

    pub fn input_count(&self) -> usize {
        1 + self.replies.len()
    }

    pub fn graph(&self) -> MixGraph {
        let delayed = self
            .replies
            .iter()
            .enumerate()
            .map(|(i, reply)| DelayedStream {
                // Input 0 is the caller track
                input_index: i + 1,
                delay_ms: reply.delay_ms,
                fade_in_ms: self.fade_in_ms,
                label: format!("r{}", i),
            })
            .collect();

        MixGraph {
            delayed,
            mix_inputs: self.input_count(),
            output_label: OUTPUT_LABEL.to_string(),
        }
    }

    /// Full ffmpeg argument list producing `output`
    pub fn ffmpeg_args(&self, encoder: &EncoderSettings, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into()];

        if let Some(format) = &self.base_format {
            args.extend(["-f".into(), format.clone()]);
        }
        args.extend(["-i".into(), self.base.display().to_string()]);

        for reply in &self.replies {
            args.extend(["-i".into(), reply.source.display().to_string()]);
        }

        let graph = self.graph();
        args.extend([
            "-filter_complex".into(),
            graph.to_filter_complex(),
            "-map".into(),
            format!("[{}]", graph.output_label),
            "-c:a".into(),
            encoder.codec.clone(),
            "-q:a".into(),
            encoder.quality.clone(),
            output.display().to_string(),
        ]);

        args
    }
}

impl MixGraph {
    /// Render as an ffmpeg `-filter_complex` expression
    pub fn to_filter_complex(&self) -> String {
        if self.delayed.is_empty() {
            // Single input: straight passthrough of the caller track
            return format!("[0:a]anull[{}]", self.output_label);
        }

        let mut parts: Vec<String> = self
            .delayed
            .iter()
            .map(|stream| {
                format!(
                    "[{}:a]afade=t=in:d={:.3},adelay={}:all=1[{}]",
                    stream.input_index,
                    stream.fade_in_ms as f64 / 1000.0,
                    stream.delay_ms,
                    stream.label
                )
            })
            .collect();

        let labels: String = self
            .delayed
            .iter()
            .map(|stream| format!("[{}]", stream.label))
            .collect();

        parts.push(format!(
            "[0:a]{}amix=inputs={}[{}]",
            labels, self.mix_inputs, self.output_label
        ));

        parts.join("; ")
    }
}

/// Execute the plan with the given ffmpeg binary
pub async fn run_ffmpeg(
    ffmpeg_path: &str,
    plan: &MixPlan,
    encoder: &EncoderSettings,
    output: &Path,
) -> Result<()> {
    let args = plan.ffmpeg_args(encoder, output);
    debug!("Running {} {}", ffmpeg_path, args.join(" "));

    let result = Command::new(ffmpeg_path)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to launch {}", ffmpeg_path))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
        bail!("Mixer exited with {}: {}", result.status, tail);
    }

    info!(
        "Mixed {} inputs into {}",
        plan.input_count(),
        output.display()
    );
    Ok(())
}
