//! Document-level failures.
//!
//! Only input problems are fatal. Provider failures, malformed responses and
//! rejected candidates are absorbed per pass and show up in
//! [`crate::stats::PipelineStats`] instead.

use serde_json::{Value, json};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document holds no text to extract from.
    #[error("Document text is empty")]
    EmptyDocument,

    /// The document reader could not produce text.
    #[error("Failed to read document '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

impl ExtractError {
    /// The `{"error": ...}` object handed to callers
    pub fn to_json(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}
