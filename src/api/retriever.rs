//! Hybrid retrieval over a document index
//!
//! Semantic candidates (MMR over the vector index) and lexical candidates (BM25)
//! are fused with weighted reciprocal rank fusion, then filtered by their cosine
//! similarity to the query.

use crate::api::indexer::DocumentIndex;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::ml::embedding::{Embedder, cosine_similarity};
use crate::ml::search::{SearchHit, sort_hits};
use crate::text::chunking::Chunk;
use std::collections::HashMap;
use std::sync::Arc;

/// Separator between chunks in prompt context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A chunk selected for a query
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// Position of the chunk in the document index
    pub id: usize,
    pub chunk: Chunk,
    /// Fused rank score
    pub score: f32,
    /// Cosine similarity to the query
    pub similarity: f32,
}

/// Combines semantic and lexical rankings
pub struct HybridRetriever {
    config: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
}

impl HybridRetriever {
    pub fn new(config: RetrievalConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self { config, embedder }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Ranked, deduplicated chunks relevant to `query`
    pub fn retrieve(&self, index: &DocumentIndex, query: &str) -> Result<Vec<RetrievedChunk>> {
        if index.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query)?;
        let c = &self.config;

        let semantic = index.vectors.max_marginal_relevance(
            &query_vector,
            c.fetch_k,
            c.semantic_k,
            c.mmr_lambda,
        )?;
        let lexical = index.lexical.search(query, c.lexical_k);
        let fused = weighted_rrf(
            &[
                (semantic.as_slice(), c.semantic_weight),
                (lexical.as_slice(), c.lexical_weight),
            ],
            c.rank_constant,
        );
        log::debug!(
            "Query {:?}: {} semantic, {} lexical, {} fused candidates",
            query,
            semantic.len(),
            lexical.len(),
            fused.len()
        );

        let mut results = Vec::new();
        for hit in fused {
            let (Some(chunk), Some(vector)) = (index.chunk(hit.id), index.vectors.vector(hit.id))
            else {
                continue;
            };
            let similarity = cosine_similarity(&query_vector, vector);
            if similarity < c.relevance_threshold {
                continue;
            }
            results.push(RetrievedChunk {
                id: hit.id,
                chunk: chunk.clone(),
                score: hit.score,
                similarity,
            });
            if results.len() >= c.max_results {
                break;
            }
        }

        log::info!("Retrieved {} chunks from {}", results.len(), index.doc_id);
        Ok(results)
    }

    /// Retrieved chunk texts joined for prompt insertion
    pub fn retrieve_context(&self, index: &DocumentIndex, query: &str) -> Result<String> {
        Ok(join_context(&self.retrieve(index, query)?))
    }
}

/// Join chunk texts with a paragraph separator
pub fn join_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Weighted reciprocal rank fusion.
///
/// Each list contributes `weight / (rank_constant + rank)` per hit, with 1-based
/// ranks. A document appearing in several lists accumulates contributions.
pub fn weighted_rrf(lists: &[(&[SearchHit], f32)], rank_constant: f32) -> Vec<SearchHit> {
    let mut scores: HashMap<usize, f32> = HashMap::new();
    for (hits, weight) in lists {
        for (rank, hit) in hits.iter().enumerate() {
            *scores.entry(hit.id).or_insert(0.0) += weight / (rank_constant + rank as f32 + 1.0);
        }
    }

    let mut fused: Vec<SearchHit> = scores
        .into_iter()
        .map(|(id, score)| SearchHit { id, score })
        .collect();
    sort_hits(&mut fused);
    fused
}
