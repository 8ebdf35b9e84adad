//! # lease-rag
//!
//! Lease PDF ingestion and retrieval: text extraction with an OCR fallback,
//! running header removal, clause segmentation, clause-aware chunking, and a
//! per-document hybrid (semantic + BM25) index that answers questions about
//! the lease through an LLM.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lease_rag::{Config, LeaseEngine};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build an engine from the default configuration
//!     let engine = LeaseEngine::from_config(Config::default())?;
//!
//!     // Ingest a lease; the identity is the SHA-256 of the PDF bytes
//!     let report = engine.ingest_file("lease.pdf")?;
//!     println!("Indexed {} chunks", report.chunk_count);
//!
//!     // Query it
//!     for hit in engine.search(&report.doc_id, "security deposit")? {
//!         println!("{:.3} - {}", hit.similarity, hit.chunk.text);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod ml;
pub mod storage;
pub mod text;
pub mod utils;

// Re-export main API types
pub use api::{
    AnswerGenerator, DocumentIndex, DocumentIndexCache, HybridRetriever, IngestReport,
    LeaseAnalyst, LeaseEngine, OpenAiChat, RetrievedChunk, RiskCategory, RiskReport,
    TopicMatch,
};
pub use config::Config;
pub use error::{IndexStage, LeaseError, Result};

// Re-export commonly used types
pub use storage::DocumentStore;
pub use text::{Chunk, ChunkMetadata, ClauseUnit};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_imports() {
        // Ensure all major types can be imported
        let config = Config::default();
        config.validate().unwrap();
    }
}
