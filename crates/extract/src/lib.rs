//! Control-narrative entity extraction.
//!
//! A document is chunked, every chunk is sent through one or more model
//! passes, the loosely-shaped answers are recovered and validated into
//! [`Entity`] records, and everything is merged and deduplicated into one
//! [`ExtractionResult`] per document.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod json;
pub mod llm;
pub mod normalizer;
pub mod pass;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod stats;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validator;

pub use aggregate::Aggregator;
pub use config::{ExtractionConfig, PromptStrategy};
pub use error::ExtractError;
pub use llm::{OllamaClient, TextGenerator};
pub use pass::PassRunner;
pub use schema::{Category, Entity, ExtractionMetadata, ExtractionResult};
pub use stats::PipelineStats;

use futures::FutureExt;
use ingest::{Chunker, DocumentReader};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, error, info, info_span, warn};

use crate::stats::TimedOperation;

pub struct Extractor {
    runner: PassRunner,
    chunker: Chunker,
    model: String,
    cancel: Option<Arc<AtomicBool>>,
}

impl Extractor {
    pub fn new(generator: Arc<dyn TextGenerator>, config: ExtractionConfig) -> Self {
        Self {
            model: generator.name().to_string(),
            runner: PassRunner::new(generator, &config),
            chunker: Chunker::new(config.chunking),
            cancel: None,
        }
    }

    /// Build with an Ollama client described by `config.model`
    pub fn from_config(config: ExtractionConfig) -> anyhow::Result<Self> {
        let client = OllamaClient::from_config(&config.model)?;
        Ok(Self::new(Arc::new(client), config))
    }

    /// Stop between chunks once `flag` is set; the result then covers only
    /// the chunks processed so far.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Extract entities from a document's text
    pub async fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractError> {
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyDocument);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("extract", run_id = %run_id, strategy = %self.runner.strategy());

        self.run(text, run_id).instrument(span).await
    }

    /// Read a document through `reader`, then extract from its text
    pub async fn extract_document(
        &self,
        reader: &dyn DocumentReader,
        path: &Path,
    ) -> Result<ExtractionResult, ExtractError> {
        let text = reader
            .read_text(path)
            .await
            .map_err(|e| ExtractError::Unreadable {
                path: path.to_path_buf(),
                reason: format!("{:#}", e),
            })?;

        self.extract(&text).await
    }

    async fn run(&self, text: &str, run_id: String) -> Result<ExtractionResult, ExtractError> {
        let timer = TimedOperation::start();
        let doc_id = ingest::generate_doc_id(text);
        let chunks = self.chunker.chunk_text(&doc_id, text);

        info!(chunks = chunks.len(), model = %self.model, "Starting extraction");

        let mut aggregator = Aggregator::new();
        let mut stats = PipelineStats {
            chunks_total: chunks.len(),
            ..PipelineStats::default()
        };

        for chunk in &chunks {
            if self.is_cancelled() {
                warn!(
                    processed = stats.chunks_processed,
                    total = chunks.len(),
                    "Extraction cancelled"
                );
                break;
            }

            // A panicking generator loses its chunk, not the document
            match AssertUnwindSafe(self.runner.run_chunk(chunk))
                .catch_unwind()
                .await
            {
                Ok(extraction) => {
                    stats.record_chunk(&extraction.outcome);
                    aggregator.extend(extraction.entities);
                }
                Err(_) => {
                    error!(chunk = chunk.index, "Chunk processing panicked, skipping chunk");
                    stats.failed_passes += 1;
                }
            }

            info!(
                chunk = chunk.index + 1,
                total = chunks.len(),
                accumulated = aggregator.len(),
                "Chunk processed"
            );
        }

        stats.record_elapsed(timer.elapsed());
        let result = aggregator.finish(ExtractionMetadata {
            strategy: self.runner.strategy(),
            run_id,
            model: self.model.clone(),
            stats,
        });

        for category in Category::ALL {
            info!(%category, count = result.get(category).len(), "Final entities");
        }

        Ok(result)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// The JSON handed to consumers: the five category lists plus metadata, or
/// a single `error` key.
pub fn render_output(outcome: &Result<ExtractionResult, ExtractError>) -> Value {
    match outcome {
        Ok(result) => serde_json::to_value(result)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
        Err(e) => e.to_json(),
    }
}
