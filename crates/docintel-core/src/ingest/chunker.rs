use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 1200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 180;

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static pattern"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Chunk size must be positive")]
    ZeroChunkSize,
    #[error("Overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

pub type ChunkResult<T> = Result<T, ChunkError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
}

/// Splits extracted text into overlapping, paragraph-aligned windows.
///
/// Sizes are measured in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> ChunkResult<Self> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub const fn overlap(&self) -> usize {
        self.overlap
    }

    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let cleaned = BLANK_RUN.replace_all(text, "\n\n");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = cleaned.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut cursor = 0;

        while cursor < len {
            let mut end = (cursor + self.chunk_size).min(len);

            if end < len {
                if let Some(split) = last_paragraph_break(&chars[cursor..end]) {
                    if split > self.chunk_size / 2 {
                        end = cursor + split;
                    }
                }
            }

            let window: String = chars[cursor..end].iter().collect();
            let content = window.trim();
            if !content.is_empty() {
                chunks.push(Chunk {
                    index: chunks.len(),
                    content: content.to_string(),
                });
            }

            if end >= len {
                break;
            }

            // A paragraph split can land closer to the cursor than the overlap;
            // drop the overlap for that step rather than walk backwards.
            let next = end.saturating_sub(self.overlap);
            cursor = if next > cursor { next } else { end };
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Chunks `text` with the default window (1200 chars, 180 overlap).
#[must_use]
pub fn chunk_text(text: &str) -> Vec<Chunk> {
    Chunker::default().chunk(text)
}

fn last_paragraph_break(window: &[char]) -> Option<usize> {
    window
        .windows(2)
        .rposition(|pair| pair[0] == '\n' && pair[1] == '\n')
}
