use anyhow::{Context, Result};
use ingest::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub strategy: PromptStrategy,
    pub chunking: ChunkerConfig,
    /// Extra attempts when a unified response collapses into conditions
    pub max_collapse_retries: usize,
    /// Gather category lists from anywhere in a nested response
    pub flatten_nested: bool,
    pub model: ModelConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStrategy {
    /// One prompt fills all five categories
    #[default]
    Unified,
    /// One narrowly scoped prompt per category
    PerCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Ask Ollama to constrain output to JSON
    pub json_mode: bool,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategy: PromptStrategy::Unified,
            chunking: ChunkerConfig::default(),
            max_collapse_retries: 1,
            flatten_nested: false,
            model: ModelConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "phi3:mini".to_string(),
            temperature: 0.0,
            json_mode: true,
            request_timeout_secs: 120,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 5000,
        }
    }
}

impl ExtractionConfig {
    /// Larger chunks, a single prompt and fewer provider retries.
    pub fn fast() -> Self {
        Self {
            strategy: PromptStrategy::Unified,
            chunking: ChunkerConfig {
                chunk_size: 2000,
                chunk_overlap: 200,
            },
            max_collapse_retries: 1,
            flatten_nested: false,
            model: ModelConfig {
                request_timeout_secs: 60,
                ..ModelConfig::default()
            },
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 250,
                max_backoff_ms: 2000,
            },
        }
    }

    /// Five scoped prompts per chunk with nested-output flattening.
    pub fn accurate() -> Self {
        Self {
            strategy: PromptStrategy::PerCategory,
            chunking: ChunkerConfig::default(),
            max_collapse_retries: 1,
            flatten_nested: true,
            model: ModelConfig {
                request_timeout_secs: 300,
                ..ModelConfig::default()
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
        }
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&raw).context(format!("Invalid config file: {:?}", path))
    }
}

impl PromptStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptStrategy::Unified => "unified",
            PromptStrategy::PerCategory => "per_category",
        }
    }
}

impl fmt::Display for PromptStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "unified" => Ok(PromptStrategy::Unified),
            "per_category" | "per-category" => Ok(PromptStrategy::PerCategory),
            other => anyhow::bail!("Unknown prompt strategy: {}", other),
        }
    }
}
