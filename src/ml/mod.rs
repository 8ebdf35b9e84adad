//! Embedding and search for lease chunks
//!
//! This module provides embedding backends, the vector similarity index with its
//! on-disk snapshot, and the BM25 keyword index used by hybrid retrieval.

pub mod embedding;
pub mod lexical;
pub mod search;

// Re-export main types and functions
pub use embedding::{Embedder, Embedding, HashingEmbedder, OpenAiEmbedder, cosine_similarity, embedder_from_config};
pub use lexical::LexicalIndex;
pub use search::{IndexInfo, SearchHit, VectorSearchIndex};
