//! Document build pipeline
//!
//! extract -> clean -> normalize -> segment -> chunk -> embed -> index. Every
//! failure is reported with the stage it happened in.

use crate::config::Config;
use crate::error::{IndexStage, LeaseError, Result};
use crate::ml::embedding::Embedder;
use crate::ml::lexical::LexicalIndex;
use crate::ml::search::VectorSearchIndex;
use crate::text::chunking::{Chunk, TextChunker};
use crate::text::clauses::{ClauseSegmenter, Segmentation, normalize_ocr_artifacts};
use crate::text::cleaner::PageCleaner;
use crate::text::pdf::{ExtractionChain, ExtractionStrategy};
use std::path::Path;

/// Separator placed between cleaned pages
const PAGE_SEPARATOR: &str = "\n\n";

/// Cleaned, normalized and segmented text of one PDF
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    /// Extraction strategy that produced the text
    pub strategy: String,
    /// Whether the strategy met its acceptance threshold
    pub accepted: bool,
    /// Normalized document text; unit and chunk offsets index into it
    pub text: String,
    /// Byte offset of each page in `text`
    pub page_starts: Vec<usize>,
    pub segmentation: Segmentation,
}

/// A fully built, immutable document index
pub struct DocumentIndex {
    pub doc_id: String,
    /// Chunk records in document order
    pub chunks: Vec<Chunk>,
    pub vectors: VectorSearchIndex,
    pub lexical: LexicalIndex,
    pub strategy: Option<String>,
    pub clause_count: usize,
}

impl DocumentIndex {
    /// Assemble an index; the keyword index is derived from `chunks`
    pub fn new(
        doc_id: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: VectorSearchIndex,
        strategy: Option<String>,
        clause_count: usize,
    ) -> Self {
        let lexical = LexicalIndex::new(&chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>());
        Self {
            doc_id: doc_id.into(),
            chunks,
            vectors,
            lexical,
            strategy,
            clause_count,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }
}

/// Text stages of the pipeline, shared by indexing and clause diffing
pub struct DocumentPipeline {
    chain: ExtractionChain,
    cleaner: PageCleaner,
    segmenter: ClauseSegmenter,
    chunker: TextChunker,
}

impl DocumentPipeline {
    pub fn new(
        chain: ExtractionChain,
        cleaner: PageCleaner,
        segmenter: ClauseSegmenter,
        chunker: TextChunker,
    ) -> Self {
        Self {
            chain,
            cleaner,
            segmenter,
            chunker,
        }
    }

    /// Pipeline with the default extraction chain for `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_strategies(config, ExtractionChain::from_config(config))
    }

    /// Pipeline with a custom extraction chain
    pub fn with_strategies(config: &Config, chain: ExtractionChain) -> Result<Self> {
        Ok(Self::new(
            chain,
            PageCleaner::new(config.cleaner.clone())?,
            ClauseSegmenter::new(config.segmentation.clone())?,
            TextChunker::new(config.chunking.clone())?,
        ))
    }

    /// Pipeline over explicit extraction strategies
    pub fn from_strategies(
        config: &Config,
        strategies: Vec<Box<dyn ExtractionStrategy>>,
    ) -> Result<Self> {
        Self::with_strategies(config, ExtractionChain::new(strategies))
    }

    pub fn segmenter(&self) -> &ClauseSegmenter {
        &self.segmenter
    }

    /// Extract and segment a PDF
    pub fn prepare(&self, pdf: &Path) -> Result<PreparedDocument> {
        let extracted = self.chain.extract(pdf)?;
        let cleaned = self.cleaner.clean_pages(&extracted.pages);

        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(cleaned.len());
        for (i, page) in cleaned.iter().enumerate() {
            if i > 0 {
                text.push_str(PAGE_SEPARATOR);
            }
            page_starts.push(text.len());
            text.push_str(&normalize_ocr_artifacts(page));
        }

        let segmentation = self.segmenter.segment_normalized(&text);
        log::info!(
            "Prepared {} pages via {}: {} units ({:?})",
            cleaned.len(),
            extracted.strategy,
            segmentation.units.len(),
            segmentation.mode
        );

        Ok(PreparedDocument {
            strategy: extracted.strategy,
            accepted: extracted.accepted,
            text,
            page_starts,
            segmentation,
        })
    }

    /// Chunk the units of a prepared document
    pub fn chunk(&self, prepared: &PreparedDocument) -> Vec<Chunk> {
        self.chunker
            .chunk_units(&prepared.segmentation.units, &prepared.page_starts)
    }

    /// Build the index of a stored PDF. Nothing is persisted here.
    pub fn build(
        &self,
        doc_id: &str,
        pdf: &Path,
        embedder: &dyn Embedder,
        approximate_threshold: usize,
    ) -> Result<DocumentIndex> {
        log::info!("Building index for document {}", doc_id);

        let prepared = self
            .prepare(pdf)
            .map_err(|e| LeaseError::indexing(doc_id, IndexStage::Extract, e))?;

        let chunks = self.chunk(&prepared);
        if chunks.is_empty() {
            return Err(LeaseError::indexing(
                doc_id,
                IndexStage::Segment,
                LeaseError::Parse("document produced no text chunks".to_string()),
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .map_err(|e| LeaseError::indexing(doc_id, IndexStage::Embed, e))?;
        log::debug!("Embedded {} chunks with {}", vectors.len(), embedder.model_name());

        let index = VectorSearchIndex::build(
            embedder.model_name(),
            embedder.dimension(),
            chunks.clone(),
            vectors,
            approximate_threshold,
        )
        .map_err(|e| LeaseError::indexing(doc_id, IndexStage::Index, e))?;

        Ok(DocumentIndex::new(
            doc_id,
            chunks,
            index,
            Some(prepared.strategy),
            prepared.segmentation.units.len(),
        ))
    }
}
