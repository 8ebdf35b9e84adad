//! Error types for lease-rag
//!
//! This module provides error handling for the ingestion pipeline, covering
//! text extraction, segmentation, embedding, index persistence and LLM calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage at which a document index build failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexStage {
    /// Text extraction from the PDF
    Extract,
    /// Cleaning, clause segmentation and chunking
    Segment,
    /// Embedding of chunks
    Embed,
    /// Similarity index construction
    Index,
    /// Writing the snapshot and manifest to disk
    Persist,
}

impl IndexStage {
    /// Stage name as used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStage::Extract => "extract",
            IndexStage::Segment => "segment",
            IndexStage::Embed => "embed",
            IndexStage::Index => "index",
            IndexStage::Persist => "persist",
        }
    }
}

impl std::fmt::Display for IndexStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for lease-rag operations
#[derive(Error, Debug)]
pub enum LeaseError {
    /// Every text extraction strategy yielded insufficient text
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Building the index for a document failed
    #[error("Indexing failed for document {doc_id} at stage '{stage}': {source}")]
    Indexing {
        doc_id: String,
        stage: IndexStage,
        #[source]
        source: Box<LeaseError>,
    },

    /// An LLM or JSON response could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// PDF processing errors
    #[error("PDF processing error: {0}")]
    Pdf(String),

    /// OCR rendering or recognition errors
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Image processing errors
    #[error("Image processing error: {0}")]
    Image(String),

    /// Embedding service errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Chat completion errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector search errors
    #[error("Search error: {0}")]
    Search(String),

    /// Snapshot and manifest storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(String),
}

impl LeaseError {
    /// Wrap an error raised while building the index for `doc_id`
    pub fn indexing(doc_id: impl Into<String>, stage: IndexStage, source: LeaseError) -> Self {
        LeaseError::Indexing {
            doc_id: doc_id.into(),
            stage,
            source: Box::new(source),
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Extraction and segmentation failures mean the input document itself is
    /// unusable; embedding, LLM and persistence failures are treated as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            LeaseError::Indexing { stage, source, .. } => match stage {
                IndexStage::Extract | IndexStage::Segment => false,
                IndexStage::Embed | IndexStage::Index | IndexStage::Persist => {
                    !matches!(**source, LeaseError::Config(_))
                }
            },
            LeaseError::Embedding(_) | LeaseError::Llm(_) | LeaseError::Io(_) => true,
            LeaseError::Storage(_) => true,
            _ => false,
        }
    }

    /// Build stage for indexing failures
    pub fn stage(&self) -> Option<IndexStage> {
        match self {
            LeaseError::Indexing { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias for lease-rag operations
pub type Result<T> = std::result::Result<T, LeaseError>;

// Implement From traits for external error types
impl From<image::ImageError> for LeaseError {
    fn from(err: image::ImageError) -> Self {
        LeaseError::Image(err.to_string())
    }
}

impl From<lopdf::Error> for LeaseError {
    fn from(err: lopdf::Error) -> Self {
        LeaseError::Pdf(err.to_string())
    }
}

impl From<bincode::Error> for LeaseError {
    fn from(err: bincode::Error) -> Self {
        LeaseError::Storage(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for LeaseError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        LeaseError::Llm(err.to_string())
    }
}
