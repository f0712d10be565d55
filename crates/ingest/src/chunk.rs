use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub index: usize,
    pub text: String,
    pub source: String,
    pub words: (usize, usize), // [start, end) word positions in the document
}

impl Chunk {
    pub fn new(
        doc_id: String,
        index: usize,
        text: String,
        source: String,
        words: (usize, usize),
    ) -> Self {
        // Generate stable chunk_id from content
        let chunk_id = Self::generate_chunk_id(&doc_id, &text, words);

        Self {
            doc_id,
            chunk_id,
            index,
            text,
            source,
            words,
        }
    }

    fn generate_chunk_id(doc_id: &str, text: &str, words: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(words.0.to_string().as_bytes());
        hasher.update(words.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    pub fn word_count(&self) -> usize {
        self.words.1 - self.words.0
    }
}
