//! Configuration for lease-rag
//!
//! Every heuristic threshold of the pipeline lives here as a plain constant with a
//! tuned default. Sections deserialize with `#[serde(default)]` so partial JSON
//! files override only what they name.

use crate::error::{LeaseError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extraction: ExtractionConfig,
    pub ocr: OcrConfig,
    pub cleaner: CleanerConfig,
    pub segmentation: SegmentationConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub topic: TopicConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

/// Acceptance thresholds of the extraction chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum characters for the embedded text layer to be trusted
    pub min_text_layer_chars: usize,
    /// Minimum characters for the OCR result to be accepted
    pub min_ocr_chars: usize,
    /// Minimum characters for the page-structured loader
    pub min_page_loader_chars: usize,
    /// Minimum characters for the structural fallback
    pub min_structural_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_layer_chars: 800,
            min_ocr_chars: 800,
            min_page_loader_chars: 400,
            min_structural_chars: 1,
        }
    }
}

/// Page rendering, preprocessing and recognition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Disable to skip the OCR strategy entirely
    pub enabled: bool,
    /// Render resolution
    pub dpi: u32,
    /// Primary page segmentation mode (uniform block of text)
    pub primary_psm: u8,
    /// Retry segmentation mode (single column of variable sizes)
    pub secondary_psm: u8,
    /// Pages yielding fewer characters in the primary mode are retried
    pub retry_min_chars: usize,
    /// Worker pool size
    pub workers: usize,
    /// Recognition language
    pub language: String,
    /// Median filter radius used for denoising
    pub denoise_radius: u32,
    /// Block radius for adaptive binarization
    pub binarize_block_radius: u32,
    /// Skew angles below this many degrees are left alone
    pub deskew_min_degrees: f32,
    /// Rasterizer binary
    pub renderer_command: String,
    /// Recognizer binary
    pub recognizer_command: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dpi: 400,
            primary_psm: 6,
            secondary_psm: 4,
            retry_min_chars: 40,
            workers: 4,
            language: "eng".to_string(),
            denoise_radius: 1,
            binarize_block_radius: 15,
            deskew_min_degrees: 0.1,
            renderer_command: "pdftoppm".to_string(),
            recognizer_command: "tesseract".to_string(),
        }
    }
}

/// Running header/footer detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Lines inspected at the top and bottom of each page
    pub edge_lines: usize,
    /// Fraction of pages a line must appear on to count as running
    pub min_page_fraction: f32,
    pub header_min_chars: usize,
    pub header_max_chars: usize,
    pub footer_min_chars: usize,
    pub footer_max_chars: usize,
    /// Documents shorter than this never have running lines
    pub min_pages: usize,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            edge_lines: 3,
            min_page_fraction: 0.6,
            header_min_chars: 5,
            header_max_chars: 120,
            footer_min_chars: 3,
            footer_max_chars: 120,
            min_pages: 2,
        }
    }
}

/// Clause segmentation heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Fewer numbered clauses than this triggers the paragraph fallback
    pub min_clauses: usize,
    /// Floor of the upper plausibility bound
    pub max_clauses_floor: usize,
    /// One clause per this many characters is the upper plausibility bound
    pub chars_per_clause: usize,
    /// Same-number headers closer than this collapse to the first
    pub duplicate_window: usize,
    /// Paragraphs and preambles must be longer than this
    pub min_paragraph_chars: usize,
    /// Maximum length of a detected clause title
    pub max_title_chars: usize,
    /// How far back reference phrasing is looked for
    pub reference_window: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_clauses: 3,
            max_clauses_floor: 150,
            chars_per_clause: 150,
            duplicate_window: 40,
            min_paragraph_chars: 40,
            max_title_chars: 80,
            reference_window: 40,
        }
    }
}

/// Configuration for text chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            overlap: 200,
        }
    }
}

/// Hybrid retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidate pool for maximal marginal relevance
    pub fetch_k: usize,
    /// Results kept by the semantic channel
    pub semantic_k: usize,
    /// Results kept by the lexical channel
    pub lexical_k: usize,
    /// 1.0 is pure relevance, 0.0 is pure diversity
    pub mmr_lambda: f32,
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    /// Rank offset of reciprocal rank fusion
    pub rank_constant: f32,
    /// Candidates below this query similarity are dropped
    pub relevance_threshold: f32,
    /// Upper bound on returned chunks
    pub max_results: usize,
    /// Documents with more chunks than this use the approximate index
    pub approximate_threshold: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fetch_k: 40,
            semantic_k: 12,
            lexical_k: 12,
            mmr_lambda: 0.5,
            semantic_weight: 0.65,
            lexical_weight: 0.35,
            rank_constant: 60.0,
            relevance_threshold: 0.35,
            max_results: 8,
            approximate_threshold: 512,
        }
    }
}

/// Topic similarity selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub threshold: f32,
    /// Chunks returned when nothing clears the threshold
    pub fallback_k: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            threshold: 0.65,
            fallback_k: 3,
        }
    }
}

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible embeddings endpoint
    OpenAi,
    /// Local deterministic feature hashing
    Hashing,
}

/// Embedding service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    /// Vector size of the model
    pub dimension: usize,
    /// Base URL for OpenAI-compatible APIs
    pub api_base: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            api_base: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 64,
            timeout_secs: 60,
        }
    }
}

/// Chat completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub api_base: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_base: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 1500,
            timeout_secs: 120,
        }
    }
}

/// Working directory layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root holding one directory per document identity
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("temp"),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LeaseError::Config(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|e| LeaseError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(LeaseError::Config("chunk_size must be positive".to_string()));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(LeaseError::Config(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.cleaner.min_page_fraction) {
            return Err(LeaseError::Config(
                "min_page_fraction must be within [0, 1]".to_string(),
            ));
        }
        let r = &self.retrieval;
        if r.semantic_weight < 0.0 || r.lexical_weight < 0.0 {
            return Err(LeaseError::Config(
                "retrieval weights must not be negative".to_string(),
            ));
        }
        if r.semantic_weight + r.lexical_weight <= 0.0 {
            return Err(LeaseError::Config(
                "retrieval weights must sum to a positive value".to_string(),
            ));
        }
        if r.fetch_k < r.semantic_k {
            return Err(LeaseError::Config(format!(
                "fetch_k {} must be at least semantic_k {}",
                r.fetch_k, r.semantic_k
            )));
        }
        if !(0.0..=1.0).contains(&r.mmr_lambda) {
            return Err(LeaseError::Config("mmr_lambda must be within [0, 1]".to_string()));
        }
        if self.ocr.workers == 0 {
            return Err(LeaseError::Config("ocr.workers must be at least 1".to_string()));
        }
        if self.embedding.dimension == 0 || self.embedding.batch_size == 0 {
            return Err(LeaseError::Config(
                "embedding dimension and batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
