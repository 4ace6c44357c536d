use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    /// Position of this chunk in the document, starting at 0
    pub index: usize,
    pub text: String,
    pub offset: (usize, usize), // [start, end) character positions
}

impl Chunk {
    pub fn new(doc_id: String, index: usize, text: String, offset: (usize, usize)) -> Self {
        // Generate stable chunk_id from content
        let chunk_id = Self::generate_chunk_id(&doc_id, &text, offset);

        Self {
            doc_id,
            chunk_id,
            index,
            text,
            offset,
        }
    }

    fn generate_chunk_id(doc_id: &str, text: &str, offset: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(offset.0.to_string().as_bytes());
        hasher.update(offset.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.offset.1 - self.offset.0
    }
}
