//! Clause segmentation for lease text
//!
//! Leases number their sections ("5.1 Rent", "Section 12 Default", "ARTICLE 3").
//! The segmenter finds those headers, tells them apart from cross-references such
//! as "pursuant to Section 24.05(b)", and cuts the document into clause units.
//! Noisy OCR output that yields too few or implausibly many headers falls back
//! to blank-line paragraphs.

use crate::config::SegmentationConfig;
use crate::error::{LeaseError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// A contiguous span of cleaned text believed to be one lease section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseUnit {
    /// Detected clause number such as "5" or "12.3"
    pub number: Option<String>,
    /// Capitalized title following the number
    pub title: Option<String>,
    /// Trimmed clause text, header included
    pub text: String,
    /// Byte offset of `text` in the normalized document
    pub offset: usize,
}

/// How the units of a [`Segmentation`] were produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentationMode {
    /// Numbered clause headers
    Numbered,
    /// Blank-line paragraphs
    Paragraphs,
}

/// Output of [`ClauseSegmenter::segment`]
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub units: Vec<ClauseUnit>,
    pub mode: SegmentationMode,
    /// Numbered headers accepted before the plausibility check
    pub header_count: usize,
}

/// A lexically valid clause number occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCandidate {
    /// Start of the label, or of the number when unlabeled
    pub start: usize,
    pub number_start: usize,
    /// End of the number, its punctuation and any title
    pub end: usize,
    pub number: String,
    pub title: Option<String>,
    /// Whether a "Section"/"Clause"/"Article" label precedes the number
    pub labeled: bool,
}

/// Outcome of checking a candidate against its surrounding text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDecision {
    Accepted,
    /// Not at start of text, start of line, or after sentence-ending punctuation
    NotAtBoundary,
    /// A bare "Section"-like word precedes the number off line-start
    BareReferenceToken,
    /// Reference phrasing ("pursuant to", "see", "hereof") surrounds the number
    ReferencePhrase,
}

const REFERENCE_TOKENS: &[&str] = &[
    "section",
    "sections",
    "sec",
    "clause",
    "clauses",
    "article",
    "articles",
    "paragraph",
    "paragraphs",
];

/// Splits cleaned lease text into clause units
pub struct ClauseSegmenter {
    config: SegmentationConfig,
    header_regex: Regex,
    reference_regex: Regex,
    trailing_reference_regex: Regex,
    paragraph_break: Regex,
}

impl ClauseSegmenter {
    /// Create a segmenter with the given configuration
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                LeaseError::Generic(format!("Failed to compile segmentation regex: {}", e))
            })
        };

        Ok(Self {
            header_regex: compile(r"(?:(?i:section|clause|article)[ \t]+)?(\d{1,2}(?:\.\d{1,2})?)")?,
            reference_regex: compile(
                r"(?i)\b(?:below|above|pursuant to|as defined|see|under|in accordance with|subject to|hereof|herein|set forth in|referred to in|of this)\b",
            )?,
            trailing_reference_regex: compile(r"(?i)^[ \t]*(?:hereof|herein|of this|above|below)\b")?,
            paragraph_break: compile(r"\n[ \t]*\n")?,
            config,
        })
    }

    /// Create a segmenter with default configuration
    pub fn with_default_config() -> Result<Self> {
        Self::new(SegmentationConfig::default())
    }

    /// Segment a whole document
    pub fn segment(&self, text: &str) -> Segmentation {
        let text = normalize_ocr_artifacts(text);
        self.segment_normalized(&text)
    }

    /// Segment text already passed through [`normalize_ocr_artifacts`].
    ///
    /// Unit offsets index into `text` unchanged.
    pub fn segment_normalized(&self, text: &str) -> Segmentation {
        let headers = self.accepted_headers(text);
        let header_count = headers.len();

        let total_chars = text.chars().count();
        let upper = self
            .config
            .max_clauses_floor
            .max(total_chars / self.config.chars_per_clause.max(1));

        if header_count == 0 || header_count < self.config.min_clauses || header_count > upper {
            log::info!(
                "Found {} numbered headers (plausible range {}..={}), falling back to paragraphs",
                header_count,
                self.config.min_clauses,
                upper
            );
            return Segmentation {
                units: self.paragraphs(text),
                mode: SegmentationMode::Paragraphs,
                header_count,
            };
        }

        let starts: Vec<usize> = headers
            .iter()
            .map(|h| {
                if at_line_start(text, h.start) {
                    line_start(text, h.start)
                } else {
                    h.start
                }
            })
            .collect();

        let mut units = Vec::with_capacity(headers.len() + 1);

        if let Some(unit) = self.trimmed_unit(text, 0, starts[0], None, None) {
            if unit.text.chars().count() > self.config.min_paragraph_chars {
                units.push(unit);
            }
        }

        for (i, header) in headers.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            if let Some(unit) = self.trimmed_unit(
                text,
                starts[i],
                end,
                Some(header.number.clone()),
                header.title.clone(),
            ) {
                units.push(unit);
            }
        }

        log::debug!("Segmented document into {} numbered clauses", header_count);
        Segmentation {
            units,
            mode: SegmentationMode::Numbered,
            header_count,
        }
    }

    /// Headers that pass every check, in document order, with near duplicates collapsed
    pub fn accepted_headers(&self, text: &str) -> Vec<HeaderCandidate> {
        let mut last_seen: HashMap<String, usize> = HashMap::new();
        let mut accepted = Vec::new();

        for candidate in self.find_candidates(text) {
            if !self.is_real_header(text, &candidate) {
                continue;
            }
            if let Some(&previous) = last_seen.get(&candidate.number) {
                if candidate.start - previous < self.config.duplicate_window {
                    log::trace!("Dropping duplicate header {} at {}", candidate.number, candidate.start);
                    continue;
                }
            }
            last_seen.insert(candidate.number.clone(), candidate.start);
            accepted.push(candidate);
        }

        accepted
    }

    /// Lexically valid clause numbers, before any context checks
    pub fn find_candidates(&self, text: &str) -> Vec<HeaderCandidate> {
        let mut candidates = Vec::new();

        for caps in self.header_regex.captures_iter(text) {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let start = whole.start();

            if let Some(prev) = text[..start].chars().next_back() {
                if prev.is_alphanumeric() || matches!(prev, '.' | ',' | '$') {
                    continue;
                }
            }

            let rest = &text[number.end()..];
            let mut rest_chars = rest.chars();
            match rest_chars.next() {
                None => {}
                Some(c) if c.is_whitespace() || matches!(c, ':' | ')' | '-') => {}
                Some('.') => {
                    if rest_chars.next().is_some_and(|c| c.is_ascii_digit()) {
                        continue;
                    }
                }
                Some(_) => continue,
            }
            if followed_by_sub_reference(rest) {
                continue;
            }

            let (title, end) = self.parse_title(text, number.end());
            candidates.push(HeaderCandidate {
                start,
                number_start: number.start(),
                end,
                number: number.as_str().to_string(),
                title,
                labeled: number.start() > start,
            });
        }

        candidates
    }

    /// Whether a candidate is a clause header rather than a cross-reference
    pub fn is_real_header(&self, text: &str, candidate: &HeaderCandidate) -> bool {
        self.classify_header(text, candidate) == HeaderDecision::Accepted
    }

    /// Check a candidate against the text around it
    pub fn classify_header(&self, text: &str, candidate: &HeaderCandidate) -> HeaderDecision {
        let line_start_header = candidate.start == 0 || at_line_start(text, candidate.start);

        if !line_start_header && !after_sentence_end(text, candidate.start) {
            return HeaderDecision::NotAtBoundary;
        }

        if !candidate.labeled && preceded_by_bare_reference_token(text, candidate.start) {
            return HeaderDecision::BareReferenceToken;
        }

        if !line_start_header {
            let window_start =
                floor_char_boundary(text, candidate.start.saturating_sub(self.config.reference_window));
            if self
                .reference_regex
                .is_match(&text[window_start..candidate.start])
            {
                return HeaderDecision::ReferencePhrase;
            }
            let after_number = &text[candidate.number_start..];
            let number_len = candidate.number.len();
            let trailing = after_number
                .get(number_len..)
                .unwrap_or_default()
                .trim_start_matches(['.', ':', ')', '-']);
            if self.trailing_reference_regex.is_match(trailing) {
                return HeaderDecision::ReferencePhrase;
            }
        }

        HeaderDecision::Accepted
    }

    /// Header at the very beginning of a single chunk, if one is confidently present
    pub fn leading_header(&self, chunk: &str) -> Option<HeaderCandidate> {
        let first = chunk.len() - chunk.trim_start().len();
        self.find_candidates(chunk)
            .into_iter()
            .take_while(|c| c.start <= first)
            .find(|c| c.start == first && self.is_real_header(chunk, c))
    }

    fn parse_title(&self, text: &str, number_end: usize) -> (Option<String>, usize) {
        let mut pos = number_end;
        if let Some(c) = text[pos..].chars().next() {
            if matches!(c, '.' | ':' | ')' | '-') {
                pos += c.len_utf8();
            }
        }
        let after_punct = pos;

        let rest = &text[pos..];
        let skipped = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        pos += skipped;

        let starts_upper = text[pos..].chars().next().is_some_and(|c| c.is_uppercase());
        if !starts_upper {
            return (None, after_punct);
        }

        let line = &text[pos..];
        let title_len = line.find(['.', '\n']).unwrap_or(line.len());
        let title = line[..title_len].trim();
        if title.is_empty() || title.chars().count() > self.config.max_title_chars {
            return (None, after_punct);
        }

        let mut end = pos + title_len;
        if line[title_len..].starts_with('.') {
            end += 1;
        }
        (Some(title.to_string()), end)
    }

    fn trimmed_unit(
        &self,
        text: &str,
        start: usize,
        end: usize,
        number: Option<String>,
        title: Option<String>,
    ) -> Option<ClauseUnit> {
        let span = &text[start..end];
        let trimmed = span.trim();
        if trimmed.is_empty() {
            return None;
        }
        let leading = span.len() - span.trim_start().len();
        Some(ClauseUnit {
            number,
            title,
            text: trimmed.to_string(),
            offset: start + leading,
        })
    }

    /// Blank-line delimited paragraphs longer than the configured minimum
    pub fn paragraphs(&self, text: &str) -> Vec<ClauseUnit> {
        let mut units = Vec::new();
        let mut start = 0;
        let mut bounds: Vec<(usize, usize)> = Vec::new();
        for separator in self.paragraph_break.find_iter(text) {
            bounds.push((start, separator.start()));
            start = separator.end();
        }
        bounds.push((start, text.len()));

        for (start, end) in bounds {
            if let Some(unit) = self.trimmed_unit(text, start, end, None, None) {
                if unit.text.chars().count() > self.config.min_paragraph_chars {
                    units.push(unit);
                }
            }
        }

        if units.is_empty() {
            if let Some(unit) = self.trimmed_unit(text, 0, text.len(), None, None) {
                units.push(unit);
            }
        }

        units
    }
}

/// Repair common OCR artifacts: compatibility forms, decimal commas between
/// digits ("5,1" -> "5.1") and en/em dashes.
///
/// The result is a fixed point: normalizing it again changes nothing.
pub fn normalize_ocr_artifacts(text: &str) -> String {
    let chars: Vec<char> = text.nfkc().collect();
    let mut out = String::with_capacity(chars.len());

    for (i, &c) in chars.iter().enumerate() {
        match c {
            ',' if i > 0
                && chars[i - 1].is_ascii_digit()
                && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) =>
            {
                out.push('.')
            }
            '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2212}' => out.push('-'),
            _ => out.push(c),
        }
    }

    out
}

fn followed_by_sub_reference(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('(')
        && chars.next().is_some_and(|c| c.is_alphabetic())
        && chars.next() == Some(')')
}

fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn at_line_start(text: &str, pos: usize) -> bool {
    text[line_start(text, pos)..pos]
        .chars()
        .all(|c| c == ' ' || c == '\t')
}

fn after_sentence_end(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    let trimmed = before.trim_end_matches([' ', '\t']);
    trimmed.len() < before.len() && trimmed.ends_with(['.', ';', ':', '!', '?'])
}

fn preceded_by_bare_reference_token(text: &str, pos: usize) -> bool {
    let before = text[..pos].trim_end();
    let before = before.strip_suffix('.').unwrap_or(before);
    let word_start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphabetic())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(before.len());
    let word = before[word_start..].to_lowercase();

    REFERENCE_TOKENS.contains(&word.as_str()) && !at_line_start(text, word_start)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
