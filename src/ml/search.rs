//! Vector similarity search over a document's chunks
//!
//! Small documents are searched exactly; above a configurable size an
//! instant-distance HNSW graph is built for approximate nearest neighbor search.
//! The index owns its chunk records (the document store) so a snapshot can be
//! reloaded without any other file.

use crate::error::{LeaseError, Result};
use crate::ml::embedding::{Embedding, cosine_similarity};
use crate::text::chunking::Chunk;
use crate::utils::write_atomic;
use instant_distance::{Builder, HnswMap, Point, Search};
use serde::{Deserialize, Serialize};
use std::path::Path;

const VECTORS_FILE: &str = "vectors.bin";
const DOCSTORE_FILE: &str = "docstore.json";
const CONFIG_FILE: &str = "config.json";

/// Point implementation for instant-distance HNSW using cosine distance
#[derive(Clone, Debug)]
pub struct VectorPoint {
    pub data: Vec<f32>,
}

impl VectorPoint {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }
}

impl Point for VectorPoint {
    fn distance(&self, other: &Self) -> f32 {
        1.0 - cosine_similarity(&self.data, &other.data)
    }
}

/// A scored hit; `score` is cosine similarity, higher is better
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: usize,
    pub score: f32,
}

/// Snapshot header describing how the vectors were produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub model: String,
    pub dimension: usize,
    pub count: usize,
}

/// Similarity index with its document store
pub struct VectorSearchIndex {
    info: IndexInfo,
    vectors: Vec<Embedding>,
    documents: Vec<Chunk>,
    /// HNSW graph, present only for large documents
    hnsw: Option<HnswMap<VectorPoint, usize>>,
}

impl VectorSearchIndex {
    /// Build an index over `documents` and their `vectors`.
    ///
    /// An HNSW graph is constructed when the document count reaches
    /// `approximate_threshold`.
    pub fn build(
        model: impl Into<String>,
        dimension: usize,
        documents: Vec<Chunk>,
        vectors: Vec<Embedding>,
        approximate_threshold: usize,
    ) -> Result<Self> {
        if documents.len() != vectors.len() {
            return Err(LeaseError::Search(format!(
                "{} documents but {} vectors",
                documents.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(LeaseError::Search(format!(
                "Vector dimension {} doesn't match index dimension {}",
                bad.len(),
                dimension
            )));
        }

        let mut index = Self {
            info: IndexInfo {
                model: model.into(),
                dimension,
                count: vectors.len(),
            },
            vectors,
            documents,
            hnsw: None,
        };
        if index.len() >= approximate_threshold.max(1) {
            index.build_hnsw();
        }
        Ok(index)
    }

    fn build_hnsw(&mut self) {
        log::info!(
            "Building HNSW index with {} vectors, dimension {}",
            self.vectors.len(),
            self.info.dimension
        );
        let points: Vec<VectorPoint> = self.vectors.iter().cloned().map(VectorPoint::new).collect();
        let ids: Vec<usize> = (0..points.len()).collect();
        self.hnsw = Some(Builder::default().seed(42).build(points, ids));
    }

    pub fn info(&self) -> &IndexInfo {
        &self.info
    }

    pub fn model(&self) -> &str {
        &self.info.model
    }

    pub fn dimension(&self) -> usize {
        self.info.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn is_approximate(&self) -> bool {
        self.hnsw.is_some()
    }

    /// Chunk records in index order
    pub fn documents(&self) -> &[Chunk] {
        &self.documents
    }

    pub fn vector(&self, id: usize) -> Option<&Embedding> {
        self.vectors.get(id)
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.info.dimension {
            return Err(LeaseError::Search(format!(
                "Query dimension {} doesn't match index dimension {}",
                query.len(),
                self.info.dimension
            )));
        }
        Ok(())
    }

    /// Cosine similarity of the query against every vector, in index order
    pub fn similarities(&self, query: &[f32]) -> Result<Vec<f32>> {
        self.check_query(query)?;
        Ok(self
            .vectors
            .iter()
            .map(|vector| cosine_similarity(query, vector))
            .collect())
    }

    /// Top `k` hits by similarity, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        match &self.hnsw {
            Some(map) => {
                self.check_query(query)?;
                let point = VectorPoint::new(query.to_vec());
                let mut search = Search::default();
                Ok(map
                    .search(&point, &mut search)
                    .take(k)
                    .map(|item| SearchHit {
                        id: *item.value,
                        score: 1.0 - item.distance,
                    })
                    .collect())
            }
            None => self.search_exact(query, k),
        }
    }

    /// Exhaustive top `k` search
    pub fn search_exact(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .similarities(query)?
            .into_iter()
            .enumerate()
            .map(|(id, score)| SearchHit { id, score })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    /// Maximal marginal relevance selection.
    ///
    /// Fetches `fetch_k` nearest candidates, then greedily picks `k` of them
    /// maximizing `lambda * relevance - (1 - lambda) * redundancy`, where
    /// redundancy is the highest similarity to an already selected candidate.
    /// Returned hits carry their query similarity.
    pub fn max_marginal_relevance(
        &self,
        query: &[f32],
        fetch_k: usize,
        k: usize,
        lambda: f32,
    ) -> Result<Vec<SearchHit>> {
        let mut candidates = self.search(query, fetch_k.max(k))?;
        let mut selected: Vec<SearchHit> = Vec::with_capacity(k);

        while selected.len() < k && !candidates.is_empty() {
            let mut best_pos = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (pos, candidate) in candidates.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|chosen| cosine_similarity(&self.vectors[candidate.id], &self.vectors[chosen.id]))
                    .fold(f32::NEG_INFINITY, f32::max);
                let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
                let score = lambda * candidate.score - (1.0 - lambda) * redundancy;
                if score > best_score {
                    best_score = score;
                    best_pos = pos;
                }
            }
            selected.push(candidates.remove(best_pos));
        }

        Ok(selected)
    }

    /// Save the snapshot into `dir`.
    ///
    /// Vectors go to `vectors.bin` (bincode), chunk records to `docstore.json` and
    /// the header to `config.json`. The header is written last, so a directory
    /// without it holds no usable snapshot.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let vectors = bincode::serialize(&self.vectors)?;
        write_atomic(dir.join(VECTORS_FILE), &vectors)?;
        write_atomic(dir.join(DOCSTORE_FILE), &serde_json::to_vec(&self.documents)?)?;
        write_atomic(dir.join(CONFIG_FILE), &serde_json::to_vec_pretty(&self.info)?)?;

        log::info!("Saved vector search index to {:?}", dir);
        Ok(())
    }

    /// Whether `dir` holds a snapshot
    pub fn exists<P: AsRef<Path>>(dir: P) -> bool {
        let dir = dir.as_ref();
        dir.join(CONFIG_FILE).is_file() && dir.join(VECTORS_FILE).is_file()
    }

    /// Read only the snapshot header
    pub fn read_info<P: AsRef<Path>>(dir: P) -> Result<IndexInfo> {
        let data = std::fs::read(dir.as_ref().join(CONFIG_FILE))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Load a snapshot saved by [`VectorSearchIndex::save`]
    pub fn load<P: AsRef<Path>>(dir: P, approximate_threshold: usize) -> Result<Self> {
        let dir = dir.as_ref();
        let info = Self::read_info(dir)?;
        let vectors: Vec<Embedding> = bincode::deserialize(&std::fs::read(dir.join(VECTORS_FILE))?)?;
        let documents: Vec<Chunk> = serde_json::from_slice(&std::fs::read(dir.join(DOCSTORE_FILE))?)
            .map_err(|e| LeaseError::Storage(format!("Corrupt document store: {}", e)))?;

        if vectors.len() != info.count {
            return Err(LeaseError::Storage(format!(
                "Snapshot header lists {} vectors, found {}",
                info.count,
                vectors.len()
            )));
        }

        let index = Self::build(info.model, info.dimension, documents, vectors, approximate_threshold)?;
        log::info!(
            "Loaded vector search index from {:?} with {} vectors",
            dir,
            index.len()
        );
        Ok(index)
    }
}

/// Sort hits by descending score, ties by ascending id
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
}
