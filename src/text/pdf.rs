//! PDF text extraction
//!
//! Extraction is an ordered chain of strategies, cheapest first. Each strategy
//! returns per-page text and carries the minimum character count at which its
//! result is trusted. Strategy errors and parser panics only move the chain on
//! to the next strategy.

use crate::config::Config;
use crate::error::{LeaseError, Result};
use crate::text::ocr::OcrStrategy;
use crate::utils::content_chars;
use lopdf::content::Content;
use lopdf::{Document, Object};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

/// One way of turning a PDF into per-page text
pub trait ExtractionStrategy: Send + Sync {
    /// Short name used in logs and ingest reports
    fn name(&self) -> &str;

    /// Minimum non-whitespace characters for the result to be accepted
    fn min_chars(&self) -> usize;

    /// Extract text, one string per page in document order
    fn extract(&self, path: &Path) -> Result<Vec<String>>;
}

/// Text produced by the extraction chain
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub pages: Vec<String>,
    /// Name of the strategy that produced the pages
    pub strategy: String,
    /// False when no strategy met its threshold and the longest result was kept
    pub accepted: bool,
}

impl ExtractedText {
    /// Non-whitespace characters across all pages
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| content_chars(p)).sum()
    }

    /// Pages joined with blank lines
    pub fn full_text(&self) -> String {
        self.pages.join("\n\n")
    }
}

/// Runs extraction strategies in order until one is accepted
pub struct ExtractionChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionChain {
    /// Create a chain from an explicit strategy list
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Text layer, OCR, page loader, then content-stream structure
    pub fn from_config(config: &Config) -> Self {
        let ex = &config.extraction;
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> =
            vec![Box::new(TextLayerStrategy::new(ex.min_text_layer_chars))];
        if config.ocr.enabled {
            strategies.push(Box::new(OcrStrategy::with_commands(
                config.ocr.clone(),
                ex.min_ocr_chars,
            )));
        }
        strategies.push(Box::new(PageLoaderStrategy::new(ex.min_page_loader_chars)));
        strategies.push(Box::new(StructuralStrategy::new(ex.min_structural_chars)));
        Self::new(strategies)
    }

    /// Strategy names in execution order
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Extract the document text.
    ///
    /// Returns the first result meeting its strategy's threshold. When none does,
    /// the longest non-empty result is returned unaccepted; when every strategy
    /// came back empty the chain fails.
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<ExtractedText> {
        let path = path.as_ref();
        let mut best: Option<ExtractedText> = None;

        for strategy in &self.strategies {
            let outcome = catch_unwind(AssertUnwindSafe(|| strategy.extract(path)));
            let pages = match outcome {
                Ok(Ok(pages)) => pages,
                Ok(Err(e)) => {
                    log::warn!("{} extraction failed for {:?}: {}", strategy.name(), path, e);
                    continue;
                }
                Err(payload) => {
                    log::warn!(
                        "{} extraction panicked for {:?}: {}",
                        strategy.name(),
                        path,
                        panic_message(payload.as_ref())
                    );
                    continue;
                }
            };

            let result = ExtractedText {
                pages,
                strategy: strategy.name().to_string(),
                accepted: true,
            };
            let chars = result.char_count();
            if chars >= strategy.min_chars().max(1) {
                log::info!(
                    "Accepted {} extraction: {} pages, {} chars",
                    strategy.name(),
                    result.pages.len(),
                    chars
                );
                return Ok(result);
            }

            log::info!(
                "{} extraction yielded {} chars (needs {}), escalating",
                strategy.name(),
                chars,
                strategy.min_chars()
            );
            if chars > 0 && best.as_ref().is_none_or(|b| chars > b.char_count()) {
                best = Some(ExtractedText {
                    accepted: false,
                    ..result
                });
            }
        }

        match best {
            Some(result) => {
                log::warn!(
                    "No extraction strategy met its threshold, keeping {} result with {} chars",
                    result.strategy,
                    result.char_count()
                );
                Ok(result)
            }
            None => Err(LeaseError::Extraction(
                "all extraction methods exhausted".to_string(),
            )),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Embedded text layer via pdf-extract
pub struct TextLayerStrategy {
    min_chars: usize,
}

impl TextLayerStrategy {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl ExtractionStrategy for TextLayerStrategy {
    fn name(&self) -> &str {
        "text-layer"
    }

    fn min_chars(&self) -> usize {
        self.min_chars
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        pdf_extract::extract_text_by_pages(path)
            .map_err(|e| LeaseError::Pdf(format!("Failed to extract text layer: {}", e)))
    }
}

/// Per-page text through lopdf's own font decoding
pub struct PageLoaderStrategy {
    min_chars: usize,
}

impl PageLoaderStrategy {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl ExtractionStrategy for PageLoaderStrategy {
    fn name(&self) -> &str {
        "page-loader"
    }

    fn min_chars(&self) -> usize {
        self.min_chars
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let doc = Document::load(path)
            .map_err(|e| LeaseError::Pdf(format!("Failed to load PDF: {}", e)))?;

        let pages = doc
            .get_pages()
            .keys()
            .map(|&number| match doc.extract_text(&[number]) {
                Ok(text) => text,
                Err(e) => {
                    log::debug!("Page loader skipped page {}: {}", number, e);
                    String::new()
                }
            })
            .collect();
        Ok(pages)
    }
}

/// Last resort: walk each page's content stream and collect text-showing
/// operators as elements, breaking lines at text positioning operators.
pub struct StructuralStrategy {
    min_chars: usize,
}

impl StructuralStrategy {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl ExtractionStrategy for StructuralStrategy {
    fn name(&self) -> &str {
        "structural"
    }

    fn min_chars(&self) -> usize {
        self.min_chars
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let doc = Document::load(path)
            .map_err(|e| LeaseError::Pdf(format!("Failed to load PDF: {}", e)))?;

        let mut pages = Vec::new();
        for (_, page_id) in doc.get_pages() {
            let operations = doc
                .get_page_content(page_id)
                .and_then(|content| Content::decode(&content))
                .map(|content| content.operations)
                .unwrap_or_default();

            let mut lines: Vec<String> = Vec::new();
            let mut current = String::new();
            for op in operations {
                match op.operator.as_str() {
                    "Tj" | "'" | "\"" => {
                        if let Some(Object::String(bytes, _)) = op.operands.last() {
                            if let Some(text) = decode_pdf_string(bytes) {
                                current.push_str(&text);
                            }
                        }
                        if op.operator != "Tj" {
                            flush_line(&mut current, &mut lines);
                        }
                    }
                    "TJ" => {
                        if let Some(Object::Array(items)) = op.operands.first() {
                            for item in items {
                                match item {
                                    Object::String(bytes, _) => {
                                        if let Some(text) = decode_pdf_string(bytes) {
                                            current.push_str(&text);
                                        }
                                    }
                                    // Large negative kerning is a word gap
                                    Object::Integer(k) if *k < -200 => current.push(' '),
                                    Object::Real(k) if *k < -200.0 => current.push(' '),
                                    _ => {}
                                }
                            }
                        }
                    }
                    "Td" | "TD" | "T*" | "ET" => flush_line(&mut current, &mut lines),
                    _ => {}
                }
            }
            flush_line(&mut current, &mut lines);
            pages.push(lines.join("\n"));
        }

        Ok(pages)
    }
}

fn flush_line(current: &mut String, lines: &mut Vec<String>) {
    let line = current.trim();
    if !line.is_empty() {
        lines.push(line.to_string());
    }
    current.clear();
}

/// Decode a PDF string operand: UTF-16BE with byte order mark, UTF-8, or
/// PDFDocEncoding treated as Latin-1.
pub fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let decoded = if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Ok(s) = std::str::from_utf8(bytes) {
        s.to_string()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    };

    let cleaned: String = decoded
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        min: usize,
        output: Option<Vec<String>>,
        calls: Arc<AtomicUsize>,
    }

    impl ExtractionStrategy for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn min_chars(&self) -> usize {
            self.min
        }
        fn extract(&self, _path: &Path) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output
                .clone()
                .ok_or_else(|| LeaseError::Pdf("unreadable".to_string()))
        }
    }

    struct Panicking;

    impl ExtractionStrategy for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn min_chars(&self) -> usize {
            1
        }
        fn extract(&self, _path: &Path) -> Result<Vec<String>> {
            panic!("font table corrupted")
        }
    }

    fn scripted(name: &'static str, min: usize, chars: Option<usize>) -> (Box<dyn ExtractionStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Scripted {
            name,
            min,
            output: chars.map(|n| vec!["x".repeat(n)]),
            calls: calls.clone(),
        };
        (Box::new(strategy), calls)
    }

    #[test]
    fn test_first_accepted_strategy_wins() {
        let (a, a_calls) = scripted("a", 800, Some(900));
        let (b, b_calls) = scripted("b", 400, Some(2000));
        let chain = ExtractionChain::new(vec![a, b]);

        let result = chain.extract("lease.pdf").unwrap();
        assert_eq!(result.strategy, "a");
        assert!(result.accepted);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_escalates_past_short_and_failing_strategies() {
        let (text_layer, _) = scripted("text-layer", 800, Some(120));
        let (ocr, _) = scripted("ocr", 800, None);
        let (loader, _) = scripted("page-loader", 400, Some(450));
        let chain = ExtractionChain::new(vec![text_layer, ocr, Box::new(Panicking), loader]);

        let result = chain.extract("scan.pdf").unwrap();
        assert_eq!(result.strategy, "page-loader");
        assert_eq!(result.char_count(), 450);
    }

    #[test]
    fn test_keeps_longest_when_nothing_accepted() {
        let (a, _) = scripted("a", 800, Some(100));
        let (b, _) = scripted("b", 400, Some(300));
        let (c, _) = scripted("c", 400, None);
        let chain = ExtractionChain::new(vec![a, b, c]);

        let result = chain.extract("thin.pdf").unwrap();
        assert_eq!(result.strategy, "b");
        assert!(!result.accepted);
    }

    #[test]
    fn test_all_empty_is_extraction_failure() {
        let (a, _) = scripted("a", 800, Some(0));
        let (b, _) = scripted("b", 1, None);
        let chain = ExtractionChain::new(vec![a, b, Box::new(Panicking)]);

        match chain.extract("blank.pdf") {
            Err(LeaseError::Extraction(msg)) => assert_eq!(msg, "all extraction methods exhausted"),
            other => panic!("expected extraction failure, got {:?}", other),
        }
    }

    #[test]
    fn test_default_chain_order() {
        let chain = ExtractionChain::from_config(&Config::default());
        assert_eq!(
            chain.strategy_names(),
            vec!["text-layer", "ocr", "page-loader", "structural"]
        );

        let mut config = Config::default();
        config.ocr.enabled = false;
        let chain = ExtractionChain::from_config(&config);
        assert_eq!(chain.strategy_names(), vec!["text-layer", "page-loader", "structural"]);
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string(b"Rent"), Some("Rent".to_string()));
        assert_eq!(
            decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x52, 0x00, 0xE9]),
            Some("R\u{e9}".to_string())
        );
        assert_eq!(decode_pdf_string(&[0x52, 0xE9]), Some("R\u{e9}".to_string()));
        assert_eq!(decode_pdf_string(b""), None);
    }
}
