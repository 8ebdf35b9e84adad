//! Text extraction and structuring for lease documents
//!
//! This module turns a PDF into pages of text, strips running headers and
//! footers, segments the text into clauses and cuts clauses into chunks.

pub mod chunking;
pub mod clauses;
pub mod cleaner;
pub mod diff;
pub mod ocr;
pub mod pdf;

// Re-export main types and functions
pub use chunking::{Chunk, ChunkMetadata, TextChunker};
pub use clauses::{ClauseSegmenter, ClauseUnit, Segmentation, SegmentationMode};
pub use cleaner::PageCleaner;
pub use diff::{ChangeKind, ClauseChange, diff_clauses};
pub use ocr::OcrStrategy;
pub use pdf::{ExtractedText, ExtractionChain, ExtractionStrategy};
