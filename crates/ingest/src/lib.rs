pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig, split_text};
pub use reader::{DocumentReader, FileReader};

use sha2::{Digest, Sha256};

/// Generate a stable document ID from its text
pub fn generate_doc_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_depends_on_content() {
        assert_eq!(generate_doc_id("a"), generate_doc_id("a"));
        assert_ne!(generate_doc_id("a"), generate_doc_id("b"));
    }

    #[test]
    fn chunks_share_the_document_id() {
        let text = "# Start\n\nOpen XV-01.\n\nStart P-101.";
        let doc_id = generate_doc_id(text);
        let chunks = Chunker::new(ChunkerConfig {
            chunk_size: 16,
            chunk_overlap: 0,
        })
        .chunk_text(&doc_id, text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.doc_id == doc_id));
        assert_eq!(chunks[0].index, 0);
    }
}
