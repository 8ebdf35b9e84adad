//! Topic clause lookup
//!
//! Ranks every chunk directly by cosine similarity to a topic, bypassing the
//! hybrid retriever, and formats the selection as headed clauses.

use crate::api::indexer::DocumentIndex;
use crate::config::TopicConfig;
use crate::error::Result;
use crate::ml::embedding::Embedder;
use crate::text::clauses::ClauseSegmenter;
use crate::utils::collapse_whitespace;
use std::sync::Arc;

const BODY_INDENT: &str = "    ";

/// A chunk matching a topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMatch {
    pub id: usize,
    pub similarity: f32,
    pub text: String,
}

/// Selects and formats chunks about a topic
pub struct TopicSelector {
    config: TopicConfig,
    embedder: Arc<dyn Embedder>,
    segmenter: ClauseSegmenter,
}

impl TopicSelector {
    pub fn new(config: TopicConfig, embedder: Arc<dyn Embedder>, segmenter: ClauseSegmenter) -> Self {
        Self {
            config,
            embedder,
            segmenter,
        }
    }

    /// Chunks at or above the similarity threshold in document order; when none
    /// qualify, the `fallback_k` most similar chunks, best first. Never empty for
    /// a non-empty index.
    pub fn select(&self, index: &DocumentIndex, topic: &str) -> Result<Vec<TopicMatch>> {
        if index.is_empty() {
            return Ok(Vec::new());
        }
        let topic_vector = self.embedder.embed(topic)?;
        let similarities = index.vectors.similarities(&topic_vector)?;

        let mut selected: Vec<(usize, f32)> = similarities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, s)| *s >= self.config.threshold)
            .collect();

        if selected.is_empty() {
            log::info!(
                "No chunk reaches {:.2} for topic {:?}; using the top {}",
                self.config.threshold,
                topic,
                self.config.fallback_k
            );
            selected = similarities.into_iter().enumerate().collect();
            selected.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            selected.truncate(self.config.fallback_k);
        }

        Ok(selected
            .into_iter()
            .filter_map(|(id, similarity)| {
                index.chunk(id).map(|chunk| TopicMatch {
                    id,
                    similarity,
                    text: chunk.text.trim().to_string(),
                })
            })
            .collect())
    }

    /// Selected chunks formatted as clauses
    pub fn clauses_for_topic(&self, index: &DocumentIndex, topic: &str) -> Result<Vec<String>> {
        Ok(self
            .select(index, topic)?
            .iter()
            .map(|m| self.format_clause(&m.text))
            .collect())
    }

    /// Heading line "number title" followed by indented body paragraphs.
    ///
    /// Without a confidently detected header the heading is omitted and the
    /// paragraphs are left unindented.
    pub fn format_clause(&self, chunk: &str) -> String {
        let chunk = chunk.trim();
        let (heading, body) = match self.segmenter.leading_header(chunk) {
            Some(header) => {
                let heading = match &header.title {
                    Some(title) => format!("{} {}", header.number, title),
                    None => header.number.clone(),
                };
                (Some(heading), &chunk[header.end..])
            }
            None => (None, chunk),
        };

        let paragraphs: Vec<String> = body
            .split("\n\n")
            .map(collapse_whitespace)
            .filter(|p| !p.is_empty())
            .collect();

        match heading {
            Some(heading) => {
                let mut out = heading;
                for paragraph in &paragraphs {
                    out.push('\n');
                    out.push_str(BODY_INDENT);
                    out.push_str(paragraph);
                }
                out
            }
            None => paragraphs.join("\n\n"),
        }
    }
}
