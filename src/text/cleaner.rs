//! Running header/footer removal and hyphenation repair
//!
//! Scanned and digital leases repeat the same title, draft marker or page
//! counter on every page. Those lines break clause detection and pollute the
//! embeddings, so they are stripped before segmentation.

use crate::config::CleanerConfig;
use crate::error::{LeaseError, Result};
use crate::utils::collapse_whitespace;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Normalized lines classified as running headers and footers
#[derive(Debug, Clone, Default)]
pub struct RunningLines {
    pub headers: HashSet<String>,
    pub footers: HashSet<String>,
}

/// Cleans raw per-page text
pub struct PageCleaner {
    config: CleanerConfig,
    page_number_patterns: Vec<Regex>,
}

impl PageCleaner {
    /// Create a cleaner with the given configuration
    pub fn new(config: CleanerConfig) -> Result<Self> {
        let patterns = [
            r"(?i)^page\s+\d+(?:\s*(?:of|/)\s*\d+)?$",
            r"^\d+\s*/\s*\d+$",
            r"^[-\u{2013}\u{2014}]\s*\d+\s*[-\u{2013}\u{2014}]$",
        ];
        let page_number_patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    LeaseError::Generic(format!("Failed to compile page number regex: {}", e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            page_number_patterns,
        })
    }

    /// Create a cleaner with default configuration
    pub fn with_default_config() -> Result<Self> {
        Self::new(CleanerConfig::default())
    }

    /// Clean every page, keeping page count and order
    pub fn clean_pages(&self, pages: &[String]) -> Vec<String> {
        let running = self.detect_running_lines(pages);
        if !running.headers.is_empty() || !running.footers.is_empty() {
            log::debug!(
                "Detected {} running header(s) and {} footer(s) across {} pages",
                running.headers.len(),
                running.footers.len(),
                pages.len()
            );
        }

        pages
            .iter()
            .map(|page| self.clean_page(page, &running))
            .collect()
    }

    /// Classify running header/footer lines by their frequency across pages
    pub fn detect_running_lines(&self, pages: &[String]) -> RunningLines {
        if pages.len() < self.config.min_pages.max(1) {
            return RunningLines::default();
        }

        let k = self.config.edge_lines;
        let mut header_counts: HashMap<String, usize> = HashMap::new();
        let mut footer_counts: HashMap<String, usize> = HashMap::new();

        for page in pages {
            let lines: Vec<String> = page
                .lines()
                .map(collapse_whitespace)
                .filter(|line| !line.is_empty())
                .collect();

            // Each line counts once per page
            let top: HashSet<&String> = lines.iter().take(k).collect();
            let bottom: HashSet<&String> = lines.iter().rev().take(k).collect();

            for line in top {
                *header_counts.entry(line.clone()).or_insert(0) += 1;
            }
            for line in bottom {
                *footer_counts.entry(line.clone()).or_insert(0) += 1;
            }
        }

        let required = ((pages.len() as f32) * self.config.min_page_fraction).ceil() as usize;
        let required = required.max(1);

        let select = |counts: HashMap<String, usize>, min: usize, max: usize| {
            counts
                .into_iter()
                .filter(|(line, count)| {
                    let len = line.chars().count();
                    *count >= required && len >= min && len <= max
                })
                .map(|(line, _)| line)
                .collect::<HashSet<_>>()
        };

        RunningLines {
            headers: select(
                header_counts,
                self.config.header_min_chars,
                self.config.header_max_chars,
            ),
            footers: select(
                footer_counts,
                self.config.footer_min_chars,
                self.config.footer_max_chars,
            ),
        }
    }

    /// Whether a line is page-number noise such as "Page 3 of 10", "3 / 10" or "- 3 -"
    pub fn is_page_number_line(&self, line: &str) -> bool {
        let normalized = collapse_whitespace(line);
        !normalized.is_empty()
            && self
                .page_number_patterns
                .iter()
                .any(|pattern| pattern.is_match(&normalized))
    }

    fn clean_page(&self, page: &str, running: &RunningLines) -> String {
        let lines: Vec<&str> = page.lines().collect();
        let k = self.config.edge_lines;

        let mut start = 0;
        let mut seen = 0;
        while start < lines.len() && seen < k {
            let normalized = collapse_whitespace(lines[start]);
            if normalized.is_empty() {
                start += 1;
                continue;
            }
            if !running.headers.contains(&normalized) {
                break;
            }
            seen += 1;
            start += 1;
        }

        let mut end = lines.len();
        let mut seen = 0;
        while end > start && seen < k {
            let normalized = collapse_whitespace(lines[end - 1]);
            if normalized.is_empty() {
                end -= 1;
                continue;
            }
            if !running.footers.contains(&normalized) {
                break;
            }
            seen += 1;
            end -= 1;
        }

        let kept: Vec<String> = lines[start..end]
            .iter()
            .filter(|line| !self.is_page_number_line(line))
            .map(|line| line.to_string())
            .collect();

        merge_hyphenated_lines(kept).join("\n")
    }
}

/// Join lines broken with a trailing hyphen, e.g. "indem-" + "nify" -> "indemnify".
///
/// Merging repeats on the joined line, so a word split over three lines is
/// repaired too.
pub fn merge_hyphenated_lines(lines: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter().peekable();

    while let Some(mut current) = iter.next() {
        while should_merge_hyphenated(&current) {
            let Some(next) = iter.peek() else {
                break;
            };
            if next.trim().is_empty() {
                break;
            }
            let next = iter.next().unwrap_or_default();
            current = format!(
                "{}{}",
                current.trim_end().trim_end_matches('-'),
                next.trim_start()
            );
        }
        merged.push(current);
    }

    merged
}

fn should_merge_hyphenated(line: &str) -> bool {
    let trimmed = line.trim_end();
    let Some(stem) = trimmed.strip_suffix('-') else {
        return false;
    };
    stem.chars()
        .last()
        .map(|c| c.is_alphabetic())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_document() -> Vec<String> {
        (1..=10)
            .map(|n| {
                format!(
                    "CONFIDENTIAL DRAFT\nBody text unique to page {n}, clause {n}.\nTenant shall comply with rule {n}.\nPage {n} of 10"
                )
            })
            .collect()
    }

    #[test]
    fn test_removes_running_header_and_page_numbers() {
        let cleaner = PageCleaner::with_default_config().unwrap();
        let cleaned = cleaner.clean_pages(&draft_document());

        assert_eq!(cleaned.len(), 10);
        let with_header = cleaned
            .iter()
            .filter(|page| page.contains("CONFIDENTIAL DRAFT"))
            .count();
        assert!(with_header <= 4);
        assert!(cleaned.iter().all(|page| !page.contains("of 10")));

        for (i, page) in cleaned.iter().enumerate() {
            let n = i + 1;
            assert!(page.contains(&format!("Body text unique to page {n}, clause {n}.")));
            assert!(page.contains(&format!("Tenant shall comply with rule {n}.")));
        }
    }

    #[test]
    fn test_infrequent_header_kept() {
        let mut pages = draft_document();
        for page in pages.iter_mut().skip(5) {
            *page = page.replacen("CONFIDENTIAL DRAFT", "Lease Agreement", 1);
        }
        let cleaner = PageCleaner::with_default_config().unwrap();
        let cleaned = cleaner.clean_pages(&pages);

        // 5 of 10 pages is under the 0.6 threshold
        assert!(cleaned.iter().take(5).all(|p| p.starts_with("CONFIDENTIAL DRAFT")));
        assert!(cleaned.iter().all(|p| !p.contains("Page ")));
    }

    #[test]
    fn test_single_page_keeps_edges() {
        let cleaner = PageCleaner::with_default_config().unwrap();
        let cleaned = cleaner.clean_pages(&["LEASE AGREEMENT\nBody\n- 1 -".to_string()]);
        assert_eq!(cleaned[0], "LEASE AGREEMENT\nBody");
    }

    #[test]
    fn test_page_number_patterns() {
        let cleaner = PageCleaner::with_default_config().unwrap();
        for line in ["Page 3", "page 3 of 10", "PAGE 3/10", "3 / 10", "- 3 -", "\u{2013} 12 \u{2013}"] {
            assert!(cleaner.is_page_number_line(line), "{line}");
        }
        for line in ["Page three", "3.1 Rent", "Section 3 of the Lease", "10"] {
            assert!(!cleaner.is_page_number_line(line), "{line}");
        }
    }

    #[test]
    fn test_hyphen_repair() {
        let lines = vec![
            "Tenant shall indem-".to_string(),
            "nify the Land-".to_string(),
            "lord against".to_string(),
            "claims 2020-".to_string(),
            "2021 period".to_string(),
        ];
        let merged = merge_hyphenated_lines(lines);
        assert_eq!(
            merged,
            vec![
                "Tenant shall indemnify the Landlord against".to_string(),
                "claims 2020-".to_string(),
                "2021 period".to_string(),
            ]
        );
    }

    #[test]
    fn test_cleaning_preserves_original_spacing() {
        let pages: Vec<String> = (1..=3)
            .map(|n| format!("ACME  LEASE\n  Indented   body {n}\nPage {n}"))
            .collect();
        let cleaner = PageCleaner::with_default_config().unwrap();
        let cleaned = cleaner.clean_pages(&pages);
        assert_eq!(cleaned[1], "  Indented   body 2");
    }
}
