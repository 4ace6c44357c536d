use ingest::Chunk;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ExtractionConfig, PromptStrategy};
use crate::json;
use crate::llm::TextGenerator;
use crate::normalizer::{self, Candidates};
use crate::prompt;
use crate::retry::RetryPolicy;
use crate::schema::{Category, Entity};
use crate::stats::PassOutcome;
use crate::validator::validate;

/// What one model invocation is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    /// All five categories from one prompt
    All,
    Single(Category),
}

impl PassTarget {
    fn categories(&self) -> &[Category] {
        match self {
            PassTarget::All => &Category::ALL,
            PassTarget::Single(category) => std::slice::from_ref(category),
        }
    }
}

/// Validated entities of one chunk, in pass order.
#[derive(Debug, Default)]
pub struct ChunkExtraction {
    pub entities: Vec<(Category, Entity)>,
    pub outcome: PassOutcome,
}

pub struct PassRunner {
    generator: Arc<dyn TextGenerator>,
    strategy: PromptStrategy,
    max_collapse_retries: usize,
    flatten_nested: bool,
    retry: RetryPolicy,
}

impl PassRunner {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &ExtractionConfig) -> Self {
        Self {
            generator,
            strategy: config.strategy,
            max_collapse_retries: config.max_collapse_retries,
            flatten_nested: config.flatten_nested,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    pub fn strategy(&self) -> PromptStrategy {
        self.strategy
    }

    /// Run every pass the strategy calls for, then validate the candidates
    /// against the chunk text.
    pub async fn run_chunk(&self, chunk: &Chunk) -> ChunkExtraction {
        let mut outcome = PassOutcome::default();

        let candidates = match self.strategy {
            PromptStrategy::Unified => self.run_pass(chunk, PassTarget::All, &mut outcome).await,
            PromptStrategy::PerCategory => {
                let mut all = Candidates::new();
                for category in Category::ALL {
                    all.extend(
                        self.run_pass(chunk, PassTarget::Single(category), &mut outcome)
                            .await,
                    );
                }
                all
            }
        };

        let entities = validate_all(chunk, &candidates, &mut outcome);
        ChunkExtraction { entities, outcome }
    }

    /// One prompt against one chunk. Yields no candidates when the model
    /// fails or its answer holds no recoverable JSON.
    pub async fn run_pass(
        &self,
        chunk: &Chunk,
        target: PassTarget,
        outcome: &mut PassOutcome,
    ) -> Candidates {
        let prompt = match target {
            PassTarget::All => prompt::build_unified_prompt(&chunk.text),
            PassTarget::Single(category) => prompt::build_category_prompt(category, &chunk.text),
        };

        let Some(mut current) = self.attempt(chunk, &prompt, target, outcome).await else {
            outcome.failed_passes += 1;
            return Candidates::new();
        };

        if target != PassTarget::All {
            return current;
        }

        let mut retries = 0;
        while current.is_collapsed() && retries < self.max_collapse_retries {
            retries += 1;
            outcome.collapse_retries += 1;
            warn!(
                chunk = chunk.index,
                conditions = current.count(Category::Conditions),
                attempt = retries,
                "Response collapsed into conditions, retrying"
            );

            // The retry answer stands even when it is unusable
            match self.attempt(chunk, &prompt, target, outcome).await {
                Some(next) => current = next,
                None => {
                    warn!(chunk = chunk.index, "Collapse retry gave no data, dropping collapsed response");
                    outcome.failed_passes += 1;
                    return Candidates::new();
                }
            }
        }

        current
    }

    async fn attempt(
        &self,
        chunk: &Chunk,
        prompt: &str,
        target: PassTarget,
        outcome: &mut PassOutcome,
    ) -> Option<Candidates> {
        let generator = &self.generator;
        let mut calls = 0;

        let response = self
            .retry
            .run(chunk.index, target, || {
                calls += 1;
                generator.generate(prompt)
            })
            .await;
        outcome.model_calls += calls;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(chunk = chunk.index, ?target, error = %e, "Model call failed");
                return None;
            }
        };

        let value = match json::recover(&response) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    chunk = chunk.index,
                    ?target,
                    error = %e,
                    response = %truncate(&response, 120),
                    "No usable JSON in model response"
                );
                return None;
            }
        };

        let categories = target.categories();
        Some(if self.flatten_nested {
            normalizer::flatten_nested(&value, categories)
        } else {
            normalizer::read_lists(&value, categories)
        })
    }
}

fn validate_all(
    chunk: &Chunk,
    candidates: &Candidates,
    outcome: &mut PassOutcome,
) -> Vec<(Category, Entity)> {
    let mut entities = Vec::with_capacity(candidates.total());

    for (category, raw) in candidates.iter() {
        outcome.candidates_seen += 1;
        match validate(category, raw, &chunk.text) {
            Ok(entity) => entities.push((category, entity)),
            Err(reason) => {
                outcome.candidates_rejected += 1;
                debug!(chunk = chunk.index, %category, %reason, "Rejected candidate");
            }
        }
    }

    entities
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::testing::MockGenerator;

    const COLLAPSED: &str = r#"{"conditions":[{"name":"X","description":"Y"}]}"#;
    const BALANCED: &str = r#"{"equipment":[{"id":"P-101","name":"Pump","description":"main feed pump"}],"parameters":[],"variables":[],"conditions":[{"name":"High Vibration","description":"Vibration > High Limit"}],"actions":[]}"#;

    fn chunk(text: &str) -> Chunk {
        Chunk::new("doc".into(), 0, text.into(), (0, text.chars().count()))
    }

    fn runner(mock: Arc<MockGenerator>, strategy: PromptStrategy) -> PassRunner {
        let config = ExtractionConfig {
            strategy,
            retry: RetryConfig {
                max_retries: 0,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
            },
            ..ExtractionConfig::default()
        };
        PassRunner::new(mock, &config)
    }

    fn names(extraction: &ChunkExtraction, category: Category) -> Vec<&str> {
        extraction
            .entities
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, e)| e.name.as_str())
            .collect()
    }

    #[tokio::test]
    async fn collapsed_model_is_called_exactly_twice() {
        let mock = Arc::new(MockGenerator::new().always(COLLAPSED));
        let runner = runner(mock.clone(), PromptStrategy::Unified);

        let extraction = runner.run_chunk(&chunk("Pump P-101 trips")).await;

        assert_eq!(mock.call_count(), 2);
        assert_eq!(extraction.outcome.model_calls, 2);
        assert_eq!(extraction.outcome.collapse_retries, 1);
        let prompts = mock.prompts();
        assert_eq!(prompts[0], prompts[1], "retry reuses the identical prompt");
    }

    #[tokio::test]
    async fn retry_result_replaces_collapsed_response() {
        let mock = Arc::new(MockGenerator::new().with_response(COLLAPSED).with_response(BALANCED));
        let runner = runner(mock.clone(), PromptStrategy::Unified);

        let extraction = runner
            .run_chunk(&chunk("Pump P-101 trips when Vibration > High Limit"))
            .await;

        assert_eq!(names(&extraction, Category::Equipment), vec!["Pump"]);
        assert_eq!(names(&extraction, Category::Conditions), vec!["High Vibration"]);
        assert!(!names(&extraction, Category::Conditions).contains(&"X"));
    }

    #[tokio::test]
    async fn balanced_response_is_not_retried() {
        let mock = Arc::new(MockGenerator::new().always(BALANCED));
        let runner = runner(mock.clone(), PromptStrategy::Unified);

        runner.run_chunk(&chunk("Pump P-101")).await;
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_retry_drops_the_collapsed_response() {
        let mock = Arc::new(
            MockGenerator::new()
                .with_response(r#"{"conditions":[{"name":"Low Flow","description":"FT-01 < 5"}]}"#)
                .with_response("I cannot comply."),
        );
        let runner = runner(mock.clone(), PromptStrategy::Unified);

        let extraction = runner.run_chunk(&chunk("Low Flow on FT-01")).await;

        assert_eq!(mock.call_count(), 2);
        assert!(extraction.entities.is_empty());
        assert_eq!(extraction.outcome.collapse_retries, 1);
        assert_eq!(extraction.outcome.failed_passes, 1);
    }

    #[tokio::test]
    async fn provider_error_on_retry_drops_the_collapsed_response() {
        let mock = Arc::new(
            MockGenerator::new()
                .with_response(COLLAPSED)
                .with_failure("connection reset"),
        );
        let runner = runner(mock.clone(), PromptStrategy::Unified);

        let extraction = runner.run_chunk(&chunk("Pump P-101 trips")).await;

        assert_eq!(mock.call_count(), 2);
        assert!(extraction.entities.is_empty());
        assert_eq!(extraction.outcome.failed_passes, 1);
    }

    #[tokio::test]
    async fn unparsable_text_yields_nothing() {
        let mock = Arc::new(MockGenerator::new().always("I cannot comply."));
        let runner = runner(mock.clone(), PromptStrategy::Unified);

        let extraction = runner.run_chunk(&chunk("Pump P-101")).await;

        assert!(extraction.entities.is_empty());
        assert_eq!(extraction.outcome.failed_passes, 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_yields_nothing() {
        let mock = Arc::new(MockGenerator::new().with_failure("model not found"));
        let runner = runner(mock.clone(), PromptStrategy::Unified);

        let extraction = runner.run_chunk(&chunk("Pump P-101")).await;

        assert!(extraction.entities.is_empty());
        assert_eq!(extraction.outcome.failed_passes, 1);
    }

    #[tokio::test]
    async fn provider_failures_are_retried_by_policy() {
        let mock = Arc::new(
            MockGenerator::new()
                .with_failure("connection reset")
                .with_response(BALANCED),
        );
        let config = ExtractionConfig {
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
            },
            ..ExtractionConfig::default()
        };
        let runner = PassRunner::new(mock.clone(), &config);

        let extraction = runner.run_chunk(&chunk("Pump P-101")).await;

        assert_eq!(extraction.outcome.model_calls, 2);
        assert_eq!(extraction.outcome.failed_passes, 0);
        assert_eq!(names(&extraction, Category::Equipment), vec!["Pump"]);
    }

    #[tokio::test]
    async fn per_category_issues_one_scoped_call_per_category() {
        let mock = Arc::new(MockGenerator::new().with_handler(|prompt| {
            Ok(if prompt.contains("List all equipment") {
                r#"{"equipment":[{"id":"SV01","name":"ProA Surge Vessel","description":""}]}"#.to_string()
            } else if prompt.contains("List all conditions") {
                // Collapsed on its own, but per-category passes never retry
                COLLAPSED.to_string()
            } else {
                r#"{"equipment":[{"name":"Leaked","description":"wrong bucket"}]}"#.to_string()
            })
        }));
        let runner = runner(mock.clone(), PromptStrategy::PerCategory);

        let extraction = runner.run_chunk(&chunk("SV01 ProA Surge Vessel")).await;

        assert_eq!(mock.call_count(), 5);
        assert_eq!(extraction.outcome.collapse_retries, 0);
        assert_eq!(names(&extraction, Category::Equipment), vec!["ProA Surge Vessel"]);
        assert_eq!(extraction.entities[0].1.id.as_deref(), Some("SV01"));
        assert_eq!(names(&extraction, Category::Conditions), Vec::<&str>::new());
        assert_eq!(extraction.outcome.candidates_rejected, 1);
    }

    #[tokio::test]
    async fn per_category_accepts_bare_arrays() {
        let mock = Arc::new(
            MockGenerator::new().always(r#"[{"name":"Open XV-01","description":"on start"}]"#),
        );
        let runner = runner(mock.clone(), PromptStrategy::PerCategory);

        let extraction = runner.run_chunk(&chunk("Open XV-01 on start")).await;

        assert_eq!(extraction.entities.len(), 5);
        assert_eq!(names(&extraction, Category::Actions), vec!["Open XV-01"]);
    }

    #[tokio::test]
    async fn invented_ids_are_cleared_against_chunk_text() {
        let mock = Arc::new(MockGenerator::new().always(
            r#"{"equipment":[{"id":"T-999","name":"Tank","description":"buffer tank"}],"parameters":[{"id":"SP-1","name":"Setpoint","description":""}]}"#,
        ));
        let runner = runner(mock, PromptStrategy::Unified);

        let extraction = runner.run_chunk(&chunk("Tank level setpoint SP-1")).await;

        assert_eq!(extraction.entities[0].1.id.as_deref(), Some(""));
        assert_eq!(extraction.entities[1].1.id.as_deref(), Some("SP-1"));
    }
}
