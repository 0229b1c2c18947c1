//! Grouping of extracted blocks into model-sized chunks.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{BlockRef, ExtractedDocument};

/// Default token ceiling per chunk.
pub const DEFAULT_MAX_TOKENS_PER_CHUNK: usize = 2000;

/// Rough token count of a text: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// A run of consecutive blocks sent to the model as one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in the chunk sequence
    pub chunk_id: usize,
    /// Blocks in reading order
    pub blocks: Vec<BlockRef>,
    /// Sum of the blocks' token estimates
    pub estimated_token_count: usize,
}

impl Chunk {
    /// The text sent to the model: block texts separated by blank lines.
    pub fn text(&self, doc: &ExtractedDocument) -> String {
        self.blocks
            .iter()
            .filter_map(|r| doc.block(*r))
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Zero-based source page indices covered by this chunk, ascending.
    pub fn page_indices(&self, doc: &ExtractedDocument) -> Vec<usize> {
        let mut pages: Vec<usize> = self
            .blocks
            .iter()
            .filter_map(|r| doc.block(*r))
            .map(|b| b.page_index)
            .collect();
        pages.dedup();
        pages
    }
}

/// Greedy, order-preserving chunker.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_tokens: usize,
}

impl Chunker {
    /// Create a chunker. A zero ceiling is a configuration error.
    pub fn new(max_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(Error::Config(
                "max_tokens_per_chunk must be greater than 0".to_string(),
            ));
        }
        Ok(Self { max_tokens })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Split a document into chunks.
    ///
    /// Blocks are never split; a block larger than the ceiling becomes a chunk
    /// of its own.
    pub fn chunk(&self, doc: &ExtractedDocument) -> Vec<Chunk> {
        self.chunk_estimates(doc.blocks().map(|(r, b)| (r, estimate_tokens(&b.text))))
    }

    fn chunk_estimates(&self, blocks: impl IntoIterator<Item = (BlockRef, usize)>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<BlockRef> = Vec::new();
        let mut tokens = 0usize;

        for (block, estimate) in blocks {
            if !current.is_empty() && tokens + estimate > self.max_tokens {
                chunks.push(Chunk {
                    chunk_id: chunks.len(),
                    blocks: std::mem::take(&mut current),
                    estimated_token_count: tokens,
                });
                tokens = 0;
            }
            current.push(block);
            tokens += estimate;
        }

        if !current.is_empty() {
            chunks.push(Chunk {
                chunk_id: chunks.len(),
                blocks: current,
                estimated_token_count: tokens,
            });
        }

        log::debug!(
            "{} chunk(s) at a ceiling of {} tokens",
            chunks.len(),
            self.max_tokens
        );
        chunks
    }
}
