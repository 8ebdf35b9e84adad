//! API layer for lease-rag
//!
//! This module ties the text pipeline, the indexes and storage together into
//! per-document indexing, retrieval and analysis.

pub mod analysis;
pub mod cache;
pub mod engine;
pub mod indexer;
pub mod llm;
pub mod retriever;
pub mod topic;

// Re-export main API types
pub use analysis::{LeaseAnalyst, NO_DOCUMENT_MESSAGE, RiskCategory, RiskReport, RiskScore};
pub use cache::{DocumentIndexCache, IndexSource};
pub use engine::{IngestReport, LeaseEngine};
pub use indexer::{DocumentIndex, DocumentPipeline, PreparedDocument};
pub use llm::{AnswerGenerator, OpenAiChat};
pub use retriever::{HybridRetriever, RetrievedChunk};
pub use topic::{TopicMatch, TopicSelector};
