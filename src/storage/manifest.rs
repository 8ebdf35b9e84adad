//! Plain chunk manifest stored next to each index snapshot
//!
//! The manifest is an ordered list of `{text, metadata}` records, readable
//! without touching the snapshot internals.

use crate::error::{LeaseError, Result};
use crate::text::chunking::Chunk;
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Chunk records of one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub doc_id: String,
    /// Embedding model the index was built with
    pub model: String,
    pub created_at: DateTime<Utc>,
    /// Extraction strategy that produced the text
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub clause_count: usize,
    pub chunks: Vec<Chunk>,
}

impl ChunkManifest {
    pub fn new(doc_id: impl Into<String>, model: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        Self {
            doc_id: doc_id.into(),
            model: model.into(),
            created_at: Utc::now(),
            strategy: None,
            clause_count: 0,
            chunks,
        }
    }

    pub fn with_build_details(mut self, strategy: impl Into<String>, clause_count: usize) -> Self {
        self.strategy = Some(strategy.into());
        self.clause_count = clause_count;
        self
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomic(path, &serde_json::to_vec(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| {
            LeaseError::Storage(format!("Corrupt chunk manifest {}: {}", path.display(), e))
        })
    }
}
