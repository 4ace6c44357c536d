use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;

/// Turns a document on disk into plain text.
///
/// PDF text extraction lives outside this workspace; it plugs in behind this
/// trait the same way [`FileReader`] does for plain-text narratives.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read_text(&self, path: &Path) -> Result<String>;
}

/// Reads `.txt` and `.md` control narratives.
pub struct FileReader;

#[async_trait]
impl DocumentReader for FileReader {
    async fn read_text(&self, path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "txt" | "md" => {
                let content = fs::read_to_string(path)
                    .await
                    .context(format!("Failed to read file: {:?}", path))?;

                if content.trim().is_empty() {
                    anyhow::bail!("No extractable text in {:?}", path);
                }
                Ok(content)
            }
            _ => anyhow::bail!("Unsupported file format: {}", extension),
        }
    }
}
