//! Hybrid retrieval and topic selection tests
//!
//! A keyword-concept embedder stands in for a real embedding model so the
//! similarity of every chunk to a query is known in advance.

use lease_rag::api::indexer::DocumentIndex;
use lease_rag::api::retriever::HybridRetriever;
use lease_rag::api::topic::TopicSelector;
use lease_rag::config::{RetrievalConfig, TopicConfig};
use lease_rag::error::Result;
use lease_rag::ml::embedding::{Embedder, Embedding, normalize};
use lease_rag::ml::search::VectorSearchIndex;
use lease_rag::text::{Chunk, ChunkMetadata, ClauseSegmenter};
use std::sync::Arc;

const CONCEPTS: &[&[&str]] = &[
    &["deposit", "security", "collateral", "guarantee", "guaranty"],
    &["rent", "payment", "monthly", "escalation"],
    &["insurance", "liability", "insured"],
    &["repair", "maintenance", "hvac", "roof"],
    &["terminate", "termination", "default", "cure"],
];

/// Counts concept keywords; the last dimension is a constant background term
struct ConceptEmbedder;

impl Embedder for ConceptEmbedder {
    fn model_name(&self) -> &str {
        "concepts"
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len() + 1
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0; self.dimension()];
        vector[CONCEPTS.len()] = 0.2;
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            for (i, keywords) in CONCEPTS.iter().enumerate() {
                if keywords.contains(&token) {
                    vector[i] += 1.0;
                }
            }
        }
        Ok(normalize(vector))
    }
}

const TEXTS: &[&str] = &[
    "Tenant pays monthly rent in advance with an annual escalation.",
    "A security deposit equal to one monthly rent is held by Landlord.",
    "Tenant delivers a collateral guarantee acceptable to Landlord.",
    "Tenant maintains liability insurance naming Landlord as insured.",
    "Landlord delivers an SNDA, a security letter and proof of roof repair.",
    "Either party may terminate upon default after the cure period.",
];

fn build_index() -> DocumentIndex {
    let chunks: Vec<Chunk> = TEXTS
        .iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source_index: i,
                chunk_index: 0,
                page: Some(1),
                clause: Some((i + 1).to_string()),
                offset: 0,
            },
        })
        .collect();
    let embedder = ConceptEmbedder;
    let vectors: Vec<Embedding> = TEXTS.iter().map(|t| embedder.embed(t).unwrap()).collect();
    let index = VectorSearchIndex::build(
        embedder.model_name(),
        embedder.dimension(),
        chunks.clone(),
        vectors,
        512,
    )
    .unwrap();
    DocumentIndex::new("lease", chunks, index, Some("fixed".to_string()), TEXTS.len())
}

fn retriever(config: RetrievalConfig) -> HybridRetriever {
    HybridRetriever::new(config, Arc::new(ConceptEmbedder))
}

#[test]
fn test_lexical_and_semantic_candidates_are_both_returned() {
    let index = build_index();
    let config = RetrievalConfig {
        semantic_k: 1,
        ..RetrievalConfig::default()
    };

    // The collateral clause is the only semantic pick and shares no term with
    // the query; the SNDA clause is found through its exact term alone.
    let results = retriever(config).retrieve(&index, "guaranty SNDA").unwrap();
    let ids: Vec<usize> = results.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 4]);
    assert!(results[0].score > results[1].score);
    assert!(results.iter().all(|r| r.similarity >= 0.35));
}

#[test]
fn test_weak_matches_are_filtered() {
    let index = build_index();
    let results = retriever(RetrievalConfig::default())
        .retrieve(&index, "security deposit")
        .unwrap();
    let ids: Vec<usize> = results.iter().map(|r| r.id).collect();

    assert!(ids.contains(&1));
    assert!(ids.contains(&2));
    // Rent, insurance and termination clauses score far below 0.35
    assert!(!ids.contains(&0));
    assert!(!ids.contains(&3));
    assert!(!ids.contains(&5));
}

#[test]
fn test_results_are_capped() {
    let index = build_index();
    let config = RetrievalConfig {
        relevance_threshold: 0.0,
        max_results: 2,
        ..RetrievalConfig::default()
    };
    let results = retriever(config).retrieve(&index, "tenant landlord").unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn test_hits_from_both_channels_rank_first() {
    let index = build_index();
    let config = RetrievalConfig {
        mmr_lambda: 1.0,
        ..RetrievalConfig::default()
    };
    let context = retriever(config)
        .retrieve_context(&index, "security deposit")
        .unwrap();
    assert_eq!(context, [TEXTS[1], TEXTS[4], TEXTS[2]].join("\n\n"));
}

fn selector() -> TopicSelector {
    TopicSelector::new(
        TopicConfig::default(),
        Arc::new(ConceptEmbedder),
        ClauseSegmenter::with_default_config().unwrap(),
    )
}

#[test]
fn test_topic_threshold_keeps_document_order() {
    let index = build_index();
    let matches = selector().select(&index, "collateral").unwrap();
    let ids: Vec<usize> = matches.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_topic_fallback_returns_top_three() {
    let index = build_index();
    // No concept keyword: every chunk stays far below the threshold
    let matches = selector().select(&index, "subordination").unwrap();
    assert_eq!(matches.len(), 3);
    assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[test]
fn test_empty_index_yields_nothing() {
    let embedder = ConceptEmbedder;
    let vectors = VectorSearchIndex::build(
        embedder.model_name(),
        embedder.dimension(),
        Vec::new(),
        Vec::new(),
        512,
    )
    .unwrap();
    let index = DocumentIndex::new("empty", Vec::new(), vectors, None, 0);

    let results = retriever(RetrievalConfig::default())
        .retrieve(&index, "rent")
        .unwrap();
    assert!(results.is_empty());
    assert!(selector().select(&index, "rent").unwrap().is_empty());
}
