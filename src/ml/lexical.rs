//! BM25 keyword index over chunk texts
//!
//! Complements embedding search on exact matches: defined terms, clause numbers,
//! amounts and dates.

use crate::ml::search::{SearchHit, sort_hits};
use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Lowercased alphanumeric terms; decimals such as `24.05` and amounts such as
/// `1,500` stay whole.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        let joins_digits = (c == '.' || c == ',')
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if c.is_alphanumeric() || joins_digits {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens.retain(|t| !STOPWORDS.contains(&t.as_str()));
    tokens
}

/// Inverted index with BM25 scoring
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    /// term -> (document, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lengths: Vec<u32>,
    avg_doc_len: f32,
}

impl LexicalIndex {
    /// Index documents; ids are positions in `texts`
    pub fn new<S: AsRef<str>>(texts: &[S]) -> Self {
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(texts.len());

        for (id, text) in texts.iter().enumerate() {
            let tokens = tokenize(text.as_ref());
            doc_lengths.push(tokens.len() as u32);

            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push((id, count));
            }
        }

        let total: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avg_doc_len = if doc_lengths.is_empty() {
            0.0
        } else {
            total as f32 / doc_lengths.len() as f32
        };

        Self {
            postings,
            doc_lengths,
            avg_doc_len,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    fn idf(&self, doc_freq: usize) -> f32 {
        let n = self.doc_lengths.len() as f32;
        let df = doc_freq as f32;
        ((n - df + 0.5) / (df + 0.5)).ln_1p()
    }

    /// Top `k` documents by BM25 score. Documents sharing no term with the
    /// query are never returned.
    pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        if self.is_empty() || self.avg_doc_len == 0.0 {
            return Vec::new();
        }

        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let mut scores: HashMap<usize, f32> = HashMap::new();
        for term in &terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(postings.len());
            for &(id, tf) in postings {
                let tf = tf as f32;
                let dl = self.doc_lengths[id] as f32;
                let norm = K1 * (1.0 - B + B * dl / self.avg_doc_len);
                *scores.entry(id).or_insert(0.0) += idf * tf * (K1 + 1.0) / (tf + norm);
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(id, score)| SearchHit { id, score })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("The Tenant shall pay $1,500 under Section 24.05."),
            vec!["tenant", "shall", "pay", "1,500", "under", "section", "24.05"]
        );
        assert!(tokenize("... -- ...").is_empty());
    }

    #[test]
    fn test_exact_term_ranks_first() {
        let index = LexicalIndex::new(&[
            "Tenant shall pay base rent monthly in advance.",
            "Landlord shall maintain the roof and structure.",
            "Tenant shall indemnify Landlord against all claims.",
        ]);
        let hits = index.search("indemnify", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn test_rarer_terms_weigh_more() {
        let index = LexicalIndex::new(&[
            "tenant rent",
            "tenant holdover",
            "tenant premises",
            "tenant access",
        ]);
        let hits = index.search("tenant holdover", 4);
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn test_no_overlap_returns_nothing() {
        let index = LexicalIndex::new(&["rent is due monthly"]);
        assert!(index.search("signage", 5).is_empty());
        assert!(LexicalIndex::new::<&str>(&[]).search("rent", 5).is_empty());
    }

    #[test]
    fn test_truncates_to_k() {
        let texts: Vec<String> = (0..10).map(|i| format!("deposit clause {}", i)).collect();
        let index = LexicalIndex::new(&texts);
        assert_eq!(index.search("deposit", 4).len(), 4);
    }
}
