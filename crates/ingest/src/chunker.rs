use crate::chunk::Chunk;
use anyhow::{ensure, Result};
use std::str::SplitWhitespace;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Upper bound on words per chunk, sized for the LLM context window.
    pub max_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_words: 1000 }
    }
}

/// Splits text into consecutive, non-overlapping runs of whole words.
#[derive(Debug, Clone)]
pub struct WordChunker {
    max_words: usize,
}

impl WordChunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        ensure!(config.max_words > 0, "chunk size must be at least one word");
        Ok(Self {
            max_words: config.max_words,
        })
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    /// Lazily yield chunks of `text`. Cloning the iterator (or calling this
    /// again) restarts from the first word.
    pub fn chunks<'a>(&self, text: &'a str) -> WordChunks<'a> {
        WordChunks {
            words: text.split_whitespace(),
            max_words: self.max_words,
        }
    }

    /// Materialize chunks with stable ids and word ranges.
    pub fn chunk_document(&self, doc_id: &str, text: &str, source: &str) -> Vec<Chunk> {
        let mut start = 0;

        self.chunks(text)
            .enumerate()
            .map(|(index, chunk_text)| {
                let count = chunk_text.split(' ').count();
                let chunk = Chunk::new(
                    doc_id.to_string(),
                    index,
                    chunk_text,
                    source.to_string(),
                    (start, start + count),
                );
                start += count;
                chunk
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    words: SplitWhitespace<'a>,
    max_words: usize,
}

impl Iterator for WordChunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut buffer = String::new();

        for word in self.words.by_ref().take(self.max_words) {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(word);
        }

        if buffer.is_empty() { None } else { Some(buffer) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_basic_chunking() {
        let chunker = WordChunker::new(ChunkerConfig::default()).unwrap();
        let text = "This is a test paragraph.\n\nThis is another paragraph.";
        let chunks = chunker.chunk_document("test-doc", text, "test.txt");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_id, "test-doc");
        assert_eq!(chunks[0].text, "This is a test paragraph. This is another paragraph.");
    }

    #[test]
    fn splits_2500_words_into_three_chunks() {
        let text = numbered_words(2500);
        let chunker = WordChunker::new(ChunkerConfig { max_words: 1000 }).unwrap();

        let chunks: Vec<String> = chunker.chunks(&text).collect();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.split(' ').count()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);

        let rebuilt: Vec<&str> = chunks.iter().flat_map(|c| c.split(' ')).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn iterator_is_restartable() {
        let text = "one two\tthree\n four five";
        let chunker = WordChunker::new(ChunkerConfig { max_words: 2 }).unwrap();

        let first = chunker.chunks(text);
        let replay = first.clone();
        let a: Vec<String> = first.collect();
        let b: Vec<String> = replay.collect();

        assert_eq!(a, vec!["one two", "three four", "five"]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let chunker = WordChunker::new(ChunkerConfig::default()).unwrap();
        assert_eq!(chunker.chunks("  \n\t ").count(), 0);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(WordChunker::new(ChunkerConfig { max_words: 0 }).is_err());
    }

    #[test]
    fn document_chunks_carry_word_ranges() {
        let text = numbered_words(25);
        let chunker = WordChunker::new(ChunkerConfig { max_words: 10 }).unwrap();
        let chunks = chunker.chunk_document("doc", &text, "doc.txt");

        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| c.words).collect();
        assert_eq!(ranges, vec![(0, 10), (10, 20), (20, 25)]);
        assert_eq!(chunks[2].index, 2);
    }
}
