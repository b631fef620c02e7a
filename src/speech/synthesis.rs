use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::Synthesizer;
use crate::config::SpeechConfig;

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    language_code: &'a str,
    voice: &'a str,
    sample_rate: u32,
}

/// Text-to-speech over HTTP, returning LINEAR16 PCM
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
    language: String,
    voice: String,
    sample_rate: u32,
}

impl HttpSynthesizer {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build synthesis HTTP client")?;

        Ok(Self {
            client,
            url: config.tts_url.clone(),
            language: config.language.clone(),
            voice: config.voice.clone(),
            sample_rate: config.sample_rate,
        })
    }
}

#[async_trait::async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        debug!("Synthesizing: {}", text);

        let response = self
            .client
            .post(&self.url)
            .json(&SynthesisRequest {
                text,
                language_code: &self.language,
                voice: &self.voice,
                sample_rate: self.sample_rate,
            })
            .send()
            .await
            .context("Synthesis request failed")?
            .error_for_status()
            .context("Synthesis service returned an error status")?;

        let audio = response
            .bytes()
            .await
            .context("Failed to read synthesized audio")?;

        info!("Synthesis succeeded, audio size: {} bytes", audio.len());
        Ok(audio.to_vec())
    }
}
