use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::{DialogueEngine, DialogueReply};
use crate::config::DialogueConfig;
use crate::storage::UserProfile;

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    session_id: &'a str,
    scenario: &'a str,
    user_info: &'a UserProfile,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    utterance: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    session_id: &'a str,
    user_text: &'a str,
}

#[derive(Debug, Serialize)]
struct ControlRequest<'a> {
    session_id: &'a str,
    clear_session: bool,
}

/// Client for the scenario dialogue service
pub struct HttpDialogueEngine {
    client: reqwest::Client,
    base_url: String,
    temperature: f64,
}

impl HttpDialogueEngine {
    pub fn new(config: &DialogueConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build dialogue HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Dialogue request to {} failed", path))?;

        if !response.status().is_success() {
            bail!("Dialogue service {} failed with status: {}", path, response.status());
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl DialogueEngine for HttpDialogueEngine {
    async fn init_session(
        &self,
        session_id: &str,
        scenario_key: &str,
        profile: &UserProfile,
    ) -> Result<String> {
        let response = self
            .post(
                "/session/init",
                &InitRequest {
                    session_id,
                    scenario: scenario_key,
                    user_info: profile,
                    temperature: self.temperature,
                },
            )
            .await?;

        let init: InitResponse = response
            .json()
            .await
            .context("Malformed session init response")?;
        Ok(init.utterance)
    }

    async fn chat(&self, session_id: &str, text: &str) -> Result<DialogueReply> {
        let response = self
            .post(
                "/chat",
                &ChatRequest {
                    session_id,
                    user_text: text,
                },
            )
            .await?;

        response.json().await.context("Malformed chat response")
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.post(
            "/session/control",
            &ControlRequest {
                session_id,
                clear_session: true,
            },
        )
        .await?;

        info!("Dialogue session {} cleared", session_id);
        Ok(())
    }
}
