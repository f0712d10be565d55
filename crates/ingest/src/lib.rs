pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::Chunk;
pub use chunker::{ChunkerConfig, WordChunker, WordChunks};
pub use reader::{collect_inputs, FileReader};

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Generate a stable document ID from file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Read a text file and split it into word chunks.
pub async fn ingest_file(file_path: &Path, chunker: &WordChunker) -> Result<Vec<Chunk>> {
    let content = FileReader::read_file(file_path).await?;
    let path_str = file_path.to_string_lossy().to_string();
    let doc_id = generate_doc_id(&path_str);

    let chunks = chunker.chunk_document(&doc_id, &content, &path_str);
    tracing::debug!(source = %path_str, chunks = chunks.len(), "Chunked document");

    Ok(chunks)
}
