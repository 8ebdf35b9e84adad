//! Per-document index cache
//!
//! Lookup order is memory, then the on-disk snapshot, then a fresh build that is
//! persisted before it is published. Each identity has its own slot mutex, so
//! concurrent first requests for the same document build it once while other
//! documents proceed independently.

use crate::api::indexer::{DocumentIndex, DocumentPipeline};
use crate::error::{IndexStage, LeaseError, Result};
use crate::ml::embedding::Embedder;
use crate::ml::search::VectorSearchIndex;
use crate::storage::{ChunkManifest, DocumentStore};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type Slot = Arc<Mutex<Option<Arc<DocumentIndex>>>>;

/// Where a cache lookup found its index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    Memory,
    Disk,
    Built,
}

/// Process-wide cache of built document indexes
pub struct DocumentIndexCache {
    store: DocumentStore,
    pipeline: DocumentPipeline,
    embedder: Arc<dyn Embedder>,
    approximate_threshold: usize,
    slots: RwLock<HashMap<String, Slot>>,
}

impl DocumentIndexCache {
    pub fn new(
        store: DocumentStore,
        pipeline: DocumentPipeline,
        embedder: Arc<dyn Embedder>,
        approximate_threshold: usize,
    ) -> Self {
        Self {
            store,
            pipeline,
            embedder,
            approximate_threshold,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn pipeline(&self) -> &DocumentPipeline {
        &self.pipeline
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Whether the index is already in memory
    ///
    /// Never waits on a build: a slot that is locked is still being filled and
    /// counts as not loaded.
    pub fn is_loaded(&self, doc_id: &str) -> bool {
        let slot = self.slots.read().get(doc_id).cloned();
        slot.is_some_and(|slot| slot.try_lock().is_some_and(|guard| guard.is_some()))
    }

    /// Ready-to-query index for `doc_id`
    pub fn get(&self, doc_id: &str) -> Result<Arc<DocumentIndex>> {
        self.get_with_source(doc_id).map(|(index, _)| index)
    }

    /// Ready-to-query index and where it came from
    pub fn get_with_source(&self, doc_id: &str) -> Result<(Arc<DocumentIndex>, IndexSource)> {
        let slot = self.slot(doc_id);
        let mut guard = slot.lock();

        if let Some(index) = guard.as_ref() {
            log::debug!("Index cache hit for {}", doc_id);
            return Ok((Arc::clone(index), IndexSource::Memory));
        }

        if let Some(index) = self.load_from_disk(doc_id) {
            log::info!("Rehydrated index for {} ({} chunks)", doc_id, index.len());
            let index = Arc::new(index);
            *guard = Some(Arc::clone(&index));
            return Ok((index, IndexSource::Disk));
        }

        let index = Arc::new(self.build(doc_id)?);
        *guard = Some(Arc::clone(&index));
        Ok((index, IndexSource::Built))
    }

    /// Drop the in-memory entry and the persisted snapshot
    pub fn invalidate(&self, doc_id: &str) -> Result<bool> {
        let slot = self.slots.write().remove(doc_id);
        let mut in_memory = false;
        if let Some(slot) = slot {
            let mut guard = slot.lock();
            in_memory = guard.take().is_some();
        }
        let on_disk = self.store.invalidate(doc_id)?;
        Ok(in_memory || on_disk)
    }

    fn slot(&self, doc_id: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(doc_id) {
            return Arc::clone(slot);
        }
        Arc::clone(
            self.slots
                .write()
                .entry(doc_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    /// Load the persisted snapshot; any problem means "rebuild"
    fn load_from_disk(&self, doc_id: &str) -> Option<DocumentIndex> {
        if !self.store.has_index(doc_id) {
            return None;
        }
        let dir = self.store.index_dir(doc_id).ok()?;

        match VectorSearchIndex::read_info(&dir) {
            Ok(info)
                if info.model == self.embedder.model_name()
                    && info.dimension == self.embedder.dimension() => {}
            Ok(info) => {
                log::warn!(
                    "Snapshot for {} was built with {} ({}d), current model is {} ({}d); rebuilding",
                    doc_id,
                    info.model,
                    info.dimension,
                    self.embedder.model_name(),
                    self.embedder.dimension()
                );
                return None;
            }
            Err(e) => {
                log::warn!("Unreadable snapshot header for {}: {}", doc_id, e);
                return None;
            }
        }

        let vectors = match VectorSearchIndex::load(&dir, self.approximate_threshold) {
            Ok(vectors) => vectors,
            Err(e) => {
                log::warn!("Failed to load snapshot for {}: {}; rebuilding", doc_id, e);
                return None;
            }
        };

        let index = match self.store.load_manifest(doc_id) {
            Ok(manifest) if manifest.chunks.len() == vectors.len() => DocumentIndex::new(
                doc_id,
                manifest.chunks,
                vectors,
                manifest.strategy,
                manifest.clause_count,
            ),
            Ok(manifest) => {
                log::warn!(
                    "Manifest for {} lists {} chunks but the snapshot has {}; using the snapshot document store",
                    doc_id,
                    manifest.chunks.len(),
                    vectors.len()
                );
                Self::from_docstore(doc_id, vectors)
            }
            Err(e) => {
                log::warn!(
                    "Manifest for {} unavailable ({}); using the snapshot document store",
                    doc_id,
                    e
                );
                Self::from_docstore(doc_id, vectors)
            }
        };
        Some(index)
    }

    fn from_docstore(doc_id: &str, vectors: VectorSearchIndex) -> DocumentIndex {
        let chunks = vectors.documents().to_vec();
        let clause_count = chunks
            .iter()
            .map(|c| c.metadata.source_index)
            .collect::<HashSet<_>>()
            .len();
        DocumentIndex::new(doc_id, chunks, vectors, None, clause_count)
    }

    fn build(&self, doc_id: &str) -> Result<DocumentIndex> {
        let pdf = self
            .store
            .pdf_path(doc_id)
            .map_err(|e| LeaseError::indexing(doc_id, IndexStage::Extract, e))?;
        if !pdf.is_file() {
            return Err(LeaseError::indexing(
                doc_id,
                IndexStage::Extract,
                LeaseError::Storage(format!("No stored PDF at {}", pdf.display())),
            ));
        }

        let index = self.pipeline.build(
            doc_id,
            &pdf,
            self.embedder.as_ref(),
            self.approximate_threshold,
        )?;
        self.persist(&index)
            .map_err(|e| LeaseError::indexing(doc_id, IndexStage::Persist, e))?;

        log::info!(
            "Built index for {}: {} chunks from {} units",
            doc_id,
            index.len(),
            index.clause_count
        );
        Ok(index)
    }

    fn persist(&self, index: &DocumentIndex) -> Result<()> {
        index.vectors.save(self.store.index_dir(&index.doc_id)?)?;
        let mut manifest = ChunkManifest::new(
            index.doc_id.clone(),
            self.embedder.model_name(),
            index.chunks.clone(),
        );
        if let Some(strategy) = &index.strategy {
            manifest = manifest.with_build_details(strategy.clone(), index.clause_count);
        }
        self.store.save_manifest(&manifest)
    }
}
