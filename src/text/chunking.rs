//! Text chunking for embedding
//!
//! Clauses longer than the chunk size are split recursively, preferring
//! paragraph, then line, then sentence, then word boundaries, and merged back
//! into overlapping windows. Every chunk remembers the clause it came from and
//! the page it starts on.

use crate::config::ChunkingConfig;
use crate::error::{LeaseError, Result};
use crate::text::clauses::ClauseUnit;
use serde::{Deserialize, Serialize};

/// Separators in priority order
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Metadata for a text chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Index of the clause or paragraph the chunk was cut from
    pub source_index: usize,
    /// Position of the chunk within its source
    pub chunk_index: usize,
    /// 1-based page the chunk starts on, when page boundaries are known
    pub page: Option<u32>,
    /// Clause number of the source
    pub clause: Option<String>,
    /// Byte offset of the chunk in the normalized document
    #[serde(default)]
    pub offset: usize,
}

/// A size-bounded slice of a clause, the unit of embedding and retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A contiguous slice of the input with its byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan<'a> {
    pub offset: usize,
    pub text: &'a str,
}

/// Text chunker for processing clauses into embeddable chunks
pub struct TextChunker {
    config: ChunkingConfig,
}

impl TextChunker {
    /// Create a new text chunker with the given configuration
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 || config.overlap >= config.chunk_size {
            return Err(LeaseError::Config(format!(
                "Invalid chunking configuration: size {} overlap {}",
                config.chunk_size, config.overlap
            )));
        }
        Ok(Self { config })
    }

    /// Create a chunker with default configuration
    pub fn with_default_config() -> Result<Self> {
        Self::new(ChunkingConfig::default())
    }

    /// Chunk clause units.
    ///
    /// `page_starts` holds the byte offset at which each page begins in the
    /// document the units were segmented from.
    pub fn chunk_units(&self, units: &[ClauseUnit], page_starts: &[usize]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for (source_index, unit) in units.iter().enumerate() {
            for (chunk_index, span) in self.chunk_text(&unit.text).into_iter().enumerate() {
                let offset = unit.offset + span.offset;
                chunks.push(Chunk {
                    text: span.text.to_string(),
                    metadata: ChunkMetadata {
                        source_index,
                        chunk_index,
                        page: page_for_offset(page_starts, offset),
                        clause: unit.number.clone(),
                        offset,
                    },
                });
            }
        }

        log::debug!("Chunked {} units into {} chunks", units.len(), chunks.len());
        chunks
    }

    /// Split text into overlapping windows of at most `chunk_size` characters
    pub fn chunk_text<'a>(&self, text: &'a str) -> Vec<TextSpan<'a>> {
        let mut pieces = Vec::new();
        self.split_recursive(text, 0, 0, &mut pieces);
        self.merge(text, &pieces)
    }

    fn split_recursive<'a>(
        &self,
        text: &'a str,
        offset: usize,
        level: usize,
        out: &mut Vec<TextSpan<'a>>,
    ) {
        if text.chars().count() <= self.config.chunk_size {
            out.push(TextSpan { offset, text });
            return;
        }

        let Some((depth, separator)) = SEPARATORS
            .iter()
            .enumerate()
            .skip(level)
            .find(|(_, sep)| text.contains(**sep))
        else {
            self.split_hard(text, offset, out);
            return;
        };

        let mut local = 0;
        for part in text.split_inclusive(separator) {
            self.split_recursive(part, offset + local, depth + 1, out);
            local += part.len();
        }
    }

    fn split_hard<'a>(&self, text: &'a str, offset: usize, out: &mut Vec<TextSpan<'a>>) {
        let mut start = 0;
        let mut count = 0;
        for (i, _) in text.char_indices() {
            if count == self.config.chunk_size {
                out.push(TextSpan {
                    offset: offset + start,
                    text: &text[start..i],
                });
                start = i;
                count = 0;
            }
            count += 1;
        }
        if start < text.len() {
            out.push(TextSpan {
                offset: offset + start,
                text: &text[start..],
            });
        }
    }

    fn merge<'a>(&self, text: &'a str, pieces: &[TextSpan<'a>]) -> Vec<TextSpan<'a>> {
        let size = self.config.chunk_size;
        let overlap = self.config.overlap;
        let lengths: Vec<usize> = pieces.iter().map(|p| p.text.chars().count()).collect();

        let mut chunks: Vec<TextSpan<'a>> = Vec::new();
        let mut window_start = 0;
        let mut total = 0;

        for (i, length) in lengths.iter().enumerate() {
            if total + length > size && i > window_start {
                push_trimmed(text, pieces, window_start, i, &mut chunks);

                while window_start < i && (total > overlap || total + length > size) {
                    total -= lengths[window_start];
                    window_start += 1;
                }
            }
            total += length;
        }
        if window_start < pieces.len() {
            push_trimmed(text, pieces, window_start, pieces.len(), &mut chunks);
        }

        chunks
    }
}

fn push_trimmed<'a>(
    text: &'a str,
    pieces: &[TextSpan<'a>],
    from: usize,
    to: usize,
    out: &mut Vec<TextSpan<'a>>,
) {
    let start = pieces[from].offset;
    let end = pieces[to - 1].offset + pieces[to - 1].text.len();
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let leading = slice.len() - slice.trim_start().len();
    let span = TextSpan {
        offset: start + leading,
        text: trimmed,
    };
    // Windows that only differ by whitespace are the same chunk
    if out.last().map(|last| last.offset + last.text.len()) == Some(span.offset + span.text.len()) {
        return;
    }
    out.push(span);
}

/// 1-based page containing `offset`
pub fn page_for_offset(page_starts: &[usize], offset: usize) -> Option<u32> {
    if page_starts.is_empty() {
        return None;
    }
    let page = page_starts.partition_point(|&start| start <= offset).max(1);
    Some(page as u32)
}
