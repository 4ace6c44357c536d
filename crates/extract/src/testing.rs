//! Scripted [`TextGenerator`] for exercising the pipeline without a model.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::llm::TextGenerator;

type Handler = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Replays queued responses in order, then falls back to a handler or a
/// fixed response. Every prompt is recorded for assertions.
#[derive(Default)]
pub struct MockGenerator {
    queue: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    handler: Option<Handler>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one successful response
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.queue.lock().unwrap().push_back(Ok(response.into()));
        self
    }

    /// Queue one provider failure
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.queue.lock().unwrap().push_back(Err(message.into()));
        self
    }

    /// Response for every call once the queue is drained
    pub fn always(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Compute responses from the prompt once the queue is drained
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            return next.map_err(anyhow::Error::msg);
        }
        if let Some(handler) = &self.handler {
            return handler(prompt);
        }
        match &self.fallback {
            Some(response) => Ok(response.clone()),
            None => anyhow::bail!("MockGenerator has no scripted response"),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
