use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ModelConfig;

/// A language model that turns a prompt into free-form text.
///
/// Nothing is assumed about the output format; callers recover structure
/// themselves. Implementations are constructed once and shared.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier, reported in result metadata
    fn name(&self) -> &str;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    json_mode: bool,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>, // "json" for structured output
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            temperature: 0.0,
            json_mode: true,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            json_mode: config.json_mode,
            client,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: self.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: self.temperature,
            },
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "phi3:mini".to_string(),
        )
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt))
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
