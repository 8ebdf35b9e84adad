//! High-level entry point tying storage, indexing and retrieval together
//!
//! Every operation takes an explicit document identity; tracking a "current"
//! document is left to the caller.

use crate::api::cache::{DocumentIndexCache, IndexSource};
use crate::api::indexer::{DocumentIndex, DocumentPipeline, PreparedDocument};
use crate::api::retriever::{HybridRetriever, RetrievedChunk, join_context};
use crate::api::topic::{TopicMatch, TopicSelector};
use crate::config::Config;
use crate::error::Result;
use crate::ml::embedding::{Embedder, embedder_from_config};
use crate::storage::DocumentStore;
use crate::text::clauses::ClauseSegmenter;
use crate::text::diff::{ClauseChange, DEFAULT_MODIFIED_THRESHOLD, diff_clauses};
use crate::text::pdf::ExtractionStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Outcome of ingesting a PDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub chunk_count: usize,
    pub clause_count: usize,
    /// Extraction strategy, when known
    pub strategy: Option<String>,
    /// Whether an existing index was reused instead of built
    pub reused: bool,
}

/// Lease ingestion and retrieval engine
pub struct LeaseEngine {
    config: Config,
    cache: DocumentIndexCache,
    retriever: HybridRetriever,
    topics: TopicSelector,
}

impl LeaseEngine {
    /// Engine with the embedder named by the configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = embedder_from_config(&config.embedding)?;
        Self::new(config, embedder)
    }

    /// Engine with the default extraction chain
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let pipeline = DocumentPipeline::from_config(&config)?;
        Self::with_pipeline(config, pipeline, embedder)
    }

    /// Engine with custom extraction strategies
    pub fn with_strategies(
        config: Config,
        strategies: Vec<Box<dyn ExtractionStrategy>>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let pipeline = DocumentPipeline::from_strategies(&config, strategies)?;
        Self::with_pipeline(config, pipeline, embedder)
    }

    pub fn with_pipeline(
        config: Config,
        pipeline: DocumentPipeline,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;
        let store = DocumentStore::new(&config.storage.root)?;
        let retriever = HybridRetriever::new(config.retrieval.clone(), Arc::clone(&embedder));
        let topics = TopicSelector::new(
            config.topic.clone(),
            Arc::clone(&embedder),
            ClauseSegmenter::new(config.segmentation.clone())?,
        );
        let cache = DocumentIndexCache::new(
            store,
            pipeline,
            embedder,
            config.retrieval.approximate_threshold,
        );

        Ok(Self {
            config,
            cache,
            retriever,
            topics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore {
        self.cache.store()
    }

    /// Store PDF bytes and build (or reuse) their index
    pub fn ingest_bytes(&self, bytes: &[u8]) -> Result<IngestReport> {
        let doc_id = self.store().import_bytes(bytes)?;
        self.ingest_stored(&doc_id)
    }

    /// Store a PDF file and build (or reuse) its index
    pub fn ingest_file<P: AsRef<Path>>(&self, path: P) -> Result<IngestReport> {
        let doc_id = self.store().import_file(path)?;
        self.ingest_stored(&doc_id)
    }

    fn ingest_stored(&self, doc_id: &str) -> Result<IngestReport> {
        let (index, source) = self.cache.get_with_source(doc_id)?;
        Ok(IngestReport {
            doc_id: doc_id.to_string(),
            chunk_count: index.len(),
            clause_count: index.clause_count,
            strategy: index.strategy.clone(),
            reused: source != IndexSource::Built,
        })
    }

    /// Whether a PDF or an index exists for the identity
    pub fn is_available(&self, doc_id: &str) -> bool {
        self.cache.is_loaded(doc_id)
            || self.store().has_document(doc_id)
            || self.store().has_index(doc_id)
    }

    /// Index for the identity, building it on first use
    pub fn index(&self, doc_id: &str) -> Result<Arc<DocumentIndex>> {
        self.cache.get(doc_id)
    }

    /// Hybrid retrieval
    pub fn search(&self, doc_id: &str, query: &str) -> Result<Vec<RetrievedChunk>> {
        let index = self.index(doc_id)?;
        self.retriever.retrieve(&index, query)
    }

    /// Retrieved chunks joined for prompt insertion
    pub fn context(&self, doc_id: &str, query: &str) -> Result<String> {
        Ok(join_context(&self.search(doc_id, query)?))
    }

    /// Chunks about a topic by direct similarity
    pub fn topic(&self, doc_id: &str, topic: &str) -> Result<Vec<TopicMatch>> {
        let index = self.index(doc_id)?;
        self.topics.select(&index, topic)
    }

    /// Topic matches formatted as clauses
    pub fn clauses_for_topic(&self, doc_id: &str, topic: &str) -> Result<Vec<String>> {
        let index = self.index(doc_id)?;
        self.topics.clauses_for_topic(&index, topic)
    }

    /// Extract, clean and segment a PDF without indexing it
    pub fn prepare_file<P: AsRef<Path>>(&self, path: P) -> Result<PreparedDocument> {
        self.cache.pipeline().prepare(path.as_ref())
    }

    /// Clause-level changes from `base` to `compare`
    pub fn diff_documents<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        base: P,
        compare: Q,
    ) -> Result<Vec<ClauseChange>> {
        let base = self.prepare_file(base)?;
        let compare = self.prepare_file(compare)?;
        let changes = diff_clauses(
            &base.segmentation.units,
            &compare.segmentation.units,
            DEFAULT_MODIFIED_THRESHOLD,
        );
        log::info!("Found {} clause changes", changes.len());
        Ok(changes)
    }

    /// Forget the index so the next request rebuilds it
    pub fn invalidate(&self, doc_id: &str) -> Result<bool> {
        self.cache.invalidate(doc_id)
    }
}
