//! Embedding generation for chunks and queries
//!
//! Two backends implement [`Embedder`]: an OpenAI-compatible embeddings endpoint
//! and a deterministic feature-hashing embedder that needs no network access.

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{LeaseError, Result};
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Turns text into fixed-size vectors
pub trait Embedder: Send + Sync {
    /// Model identifier, stored with persisted indexes
    fn model_name(&self) -> &str;

    /// Vector size
    fn dimension(&self) -> usize;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed many texts, preserving order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Build the embedder named by the configuration
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::OpenAi => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
    }
}

/// Deterministic bag-of-words embedder.
///
/// Each lowercased token is hashed and its digest bytes are spread over a few
/// dimensions, so texts sharing vocabulary land close together.
pub struct HashingEmbedder {
    dimension: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model: format!("hashing-{}", dimension.max(1)),
        }
    }
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut embedding = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            // Four (index, weight) pairs per token
            for pair in digest.chunks(8).take(4) {
                let mut idx_bytes = [0u8; 4];
                idx_bytes.copy_from_slice(&pair[..4]);
                let idx = u32::from_le_bytes(idx_bytes) as usize % self.dimension;
                let weight = pair[4] as f32 / 255.0 + 0.5;
                let sign = if pair[5] & 1 == 0 { 1.0 } else { -1.0 };
                embedding[idx] += sign * weight;
            }
        }

        Ok(normalize(embedding))
    }
}

/// Embeddings from an OpenAI-compatible API.
///
/// The client is async; requests are driven on a private single-threaded runtime
/// so callers stay synchronous. Must not be called from inside another runtime.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    runtime: tokio::runtime::Runtime,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LeaseError::Config(format!(
                "Environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        let client = openai_client(&api_key, config.api_base.as_deref(), config.timeout_secs)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            client,
            runtime,
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Embedding>> {
        let expected = input.len();
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(input)
            .build()?;
        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        if data.len() != expected {
            return Err(LeaseError::Embedding(format!(
                "Expected {} embeddings, received {}",
                expected,
                data.len()
            )));
        }
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| LeaseError::Embedding("Empty embedding response".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            log::debug!("Requesting {} embeddings from {}", batch.len(), self.model);
            let vectors = self.runtime.block_on(self.request(batch.to_vec()))?;
            for vector in &vectors {
                if vector.len() != self.dimension {
                    return Err(LeaseError::Embedding(format!(
                        "Model {} returned dimension {}, configured {}",
                        self.model,
                        vector.len(),
                        self.dimension
                    )));
                }
            }
            embeddings.extend(vectors);
        }
        Ok(embeddings)
    }
}

/// OpenAI client with an explicit request timeout
pub(crate) fn openai_client(
    api_key: &str,
    api_base: Option<&str>,
    timeout_secs: u64,
) -> Result<Client<OpenAIConfig>> {
    let mut config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(base) = api_base {
        config = config.with_api_base(base);
    }
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LeaseError::Config(format!("Failed to build HTTP client: {}", e)))?;
    Ok(Client::with_config(config).with_http_client(http))
}

/// Scale to unit length; zero vectors are returned unchanged
pub fn normalize(mut embedding: Embedding) -> Embedding {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut embedding {
            *value /= norm;
        }
    }
    embedding
}

/// Cosine similarity; zero vectors are dissimilar to everything
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hashing_embedding_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(256);
        let a = embedder.embed("Tenant shall pay rent monthly").unwrap();
        let b = embedder.embed("Tenant shall pay rent monthly").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_hashing_embedding_is_case_insensitive() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed("Security Deposit").unwrap();
        let b = embedder.embed("security deposit").unwrap();
        assert_relative_eq!(cosine_similarity(&a, &b), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(512);
        let query = embedder.embed("security deposit refund").unwrap();
        let related = embedder.embed("the security deposit is refunded at the end").unwrap();
        let unrelated = embedder.embed("signage on the building facade").unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let empty = embedder.embed("   ").unwrap();
        assert!(empty.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_embed_batch_preserves_order() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["rent".to_string(), "insurance".to_string()];
        let batch = embedder.embed_batch(&texts).unwrap();
        assert_eq!(batch[0], embedder.embed("rent").unwrap());
        assert_eq!(batch[1], embedder.embed("insurance").unwrap());
    }

    #[test]
    fn test_cosine_similarity() {
        assert_relative_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_relative_eq!(cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]), 1.0, epsilon = 1e-6);
        assert_relative_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_normalize() {
        let v = normalize(vec![3.0, 4.0, 0.0]);
        assert_relative_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(v[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_embedder_from_config_hashing() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hashing,
            dimension: 32,
            ..EmbeddingConfig::default()
        };
        let embedder = embedder_from_config(&config).unwrap();
        assert_eq!(embedder.dimension(), 32);
        assert_eq!(embedder.model_name(), "hashing-32");
    }
}
