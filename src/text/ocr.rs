//! OCR fallback for scanned leases
//!
//! Pages are rendered to rasters, cleaned up (grayscale, contrast stretch,
//! median denoise, adaptive binarization, deskew) and recognized on a bounded
//! worker pool. Recognition results are reassembled by page index, so the order
//! in which workers finish never affects the output.

use crate::config::OcrConfig;
use crate::error::{LeaseError, Result};
use crate::text::pdf::ExtractionStrategy;
use crate::utils::content_chars;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::contrast::{adaptive_threshold, stretch_contrast};
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;

/// Renders a single PDF page to a raster
pub trait PageRenderer: Send + Sync {
    /// Whether the renderer can run on this machine
    fn is_available(&self) -> bool;

    /// Number of pages in the document
    fn page_count(&self, pdf: &Path) -> Result<usize>;

    /// Render page `page_index` (0-based) at `dpi`, using `scratch` for any
    /// temporary files
    fn render(&self, pdf: &Path, page_index: usize, dpi: u32, scratch: &Path) -> Result<DynamicImage>;
}

/// Recognizes text on a preprocessed page image
pub trait TextRecognizer: Send + Sync {
    fn is_available(&self) -> bool;

    /// Recognize `image` with the given page segmentation mode
    fn recognize(&self, page_index: usize, image: &GrayImage, psm: u8) -> Result<String>;
}

/// OCR extraction strategy
pub struct OcrStrategy {
    config: OcrConfig,
    min_chars: usize,
    renderer: Box<dyn PageRenderer>,
    recognizer: Box<dyn TextRecognizer>,
}

impl OcrStrategy {
    /// Create a strategy from explicit renderer and recognizer
    pub fn new(
        config: OcrConfig,
        min_chars: usize,
        renderer: Box<dyn PageRenderer>,
        recognizer: Box<dyn TextRecognizer>,
    ) -> Self {
        Self {
            config,
            min_chars,
            renderer,
            recognizer,
        }
    }

    /// Strategy backed by the `pdftoppm` and `tesseract` binaries
    pub fn with_commands(config: OcrConfig, min_chars: usize) -> Self {
        let renderer = PdftoppmRenderer::new(config.renderer_command.clone());
        let recognizer =
            TesseractRecognizer::new(config.recognizer_command.clone(), config.language.clone());
        Self::new(config, min_chars, Box::new(renderer), Box::new(recognizer))
    }

    /// Recognize every page; the result has one entry per page in page order
    pub fn recognize_pages(&self, pdf: &Path) -> Result<Vec<String>> {
        let page_count = self.renderer.page_count(pdf)?;
        if page_count == 0 {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
            .map_err(|e| LeaseError::Ocr(format!("Failed to build OCR worker pool: {}", e)))?;
        let scratch = tempfile::tempdir()?;
        let scratch_path = scratch.path();

        log::info!(
            "Running OCR on {} pages with {} workers at {} dpi",
            page_count,
            self.config.workers,
            self.config.dpi
        );

        let (tx, rx) = mpsc::channel::<(usize, String)>();
        pool.scope(|scope| {
            for page_index in 0..page_count {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let text = self.process_page(pdf, page_index, scratch_path);
                    // The receiver outlives the scope
                    let _ = tx.send((page_index, text));
                });
            }
        });
        drop(tx);

        let mut results: Vec<(usize, String)> = rx.into_iter().collect();
        results.sort_by_key(|(page_index, _)| *page_index);
        Ok(results.into_iter().map(|(_, text)| text).collect())
    }

    /// Render, preprocess and recognize one page. Failures yield an empty page.
    fn process_page(&self, pdf: &Path, page_index: usize, scratch: &Path) -> String {
        let image = match self.renderer.render(pdf, page_index, self.config.dpi, scratch) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Failed to render page {}: {}", page_index + 1, e);
                return String::new();
            }
        };
        let prepared = preprocess_page(&image, &self.config);

        let primary = self
            .recognizer
            .recognize(page_index, &prepared, self.config.primary_psm)
            .unwrap_or_else(|e| {
                log::warn!("Recognition failed on page {}: {}", page_index + 1, e);
                String::new()
            });
        if content_chars(&primary) >= self.config.retry_min_chars {
            return primary;
        }

        log::debug!(
            "Page {} yielded {} chars with psm {}, retrying with psm {}",
            page_index + 1,
            content_chars(&primary),
            self.config.primary_psm,
            self.config.secondary_psm
        );
        match self
            .recognizer
            .recognize(page_index, &prepared, self.config.secondary_psm)
        {
            Ok(secondary) if content_chars(&secondary) > content_chars(&primary) => secondary,
            Ok(_) => primary,
            Err(e) => {
                log::warn!("Retry recognition failed on page {}: {}", page_index + 1, e);
                primary
            }
        }
    }
}

impl ExtractionStrategy for OcrStrategy {
    fn name(&self) -> &str {
        "ocr"
    }

    fn min_chars(&self) -> usize {
        self.min_chars
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        if !self.renderer.is_available() || !self.recognizer.is_available() {
            return Err(LeaseError::Ocr(
                "page renderer or text recognizer is unavailable".to_string(),
            ));
        }
        self.recognize_pages(path)
    }
}

/// Deterministic cleanup applied to every page before recognition
pub fn preprocess_page(image: &DynamicImage, config: &OcrConfig) -> GrayImage {
    let stretched = stretch_to_full_range(&image.to_luma8());
    let denoised = if config.denoise_radius > 0 {
        median_filter(&stretched, config.denoise_radius, config.denoise_radius)
    } else {
        stretched
    };
    let binary = adaptive_threshold(&denoised, config.binarize_block_radius);
    deskew(&binary, config.deskew_min_degrees)
}

/// Map the darkest and lightest pixels of a page to black and white
pub fn stretch_to_full_range(gray: &GrayImage) -> GrayImage {
    let (low, high) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(low, high), p| (low.min(p[0]), high.max(p[0])));
    if low >= high {
        return gray.clone();
    }
    stretch_contrast(gray, low, high, 0, 255)
}

/// Rotate a binarized page so its text block is level
pub fn deskew(image: &GrayImage, min_degrees: f32) -> GrayImage {
    match estimate_skew(image) {
        Some(angle) if angle.abs() >= min_degrees => {
            log::debug!("Deskewing page by {:.2} degrees", angle);
            rotate_about_center(
                image,
                -angle.to_radians(),
                Interpolation::Bilinear,
                Luma([255u8]),
            )
        }
        _ => image.clone(),
    }
}

/// Skew angle in degrees within (-45, 45], from the minimum-area rectangle
/// around dark foreground pixels.
///
/// Positive angles mean the text slopes downward to the right.
pub fn estimate_skew(image: &GrayImage) -> Option<f32> {
    let (width, height) = image.dimensions();
    let pixels = width as u64 * height as u64;
    let stride = ((pixels / 1_000_000) as u32).max(1);

    let mut points: Vec<Point<i32>> = Vec::new();
    for y in (0..height).step_by(stride as usize) {
        for x in (0..width).step_by(stride as usize) {
            if image.get_pixel(x, y)[0] < 128 {
                points.push(Point::new(x as i32, y as i32));
            }
        }
    }
    if points.len() < 3 {
        return None;
    }

    let rect = min_area_rect(&points);
    let dx = (rect[1].x - rect[0].x) as f32;
    let dy = (rect[1].y - rect[0].y) as f32;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    let mut angle = dy.atan2(dx).to_degrees();
    while angle > 45.0 {
        angle -= 90.0;
    }
    while angle <= -45.0 {
        angle += 90.0;
    }
    Some(angle)
}

fn command_available(command: &str, version_flag: &str) -> bool {
    Command::new(command)
        .arg(version_flag)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Renders pages with poppler's `pdftoppm`
pub struct PdftoppmRenderer {
    command: String,
}

impl PdftoppmRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn is_available(&self) -> bool {
        command_available(&self.command, "-v")
    }

    fn page_count(&self, pdf: &Path) -> Result<usize> {
        let doc = lopdf::Document::load(pdf)
            .map_err(|e| LeaseError::Pdf(format!("Failed to load PDF: {}", e)))?;
        Ok(doc.get_pages().len())
    }

    fn render(&self, pdf: &Path, page_index: usize, dpi: u32, scratch: &Path) -> Result<DynamicImage> {
        let page_number = (page_index + 1).to_string();
        let prefix: PathBuf = scratch.join(format!("page-{}", page_number));

        let output = Command::new(&self.command)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(&page_number)
            .arg("-l")
            .arg(&page_number)
            .arg("-png")
            .arg("-singlefile")
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(|e| LeaseError::Ocr(format!("Failed to run {}: {}", self.command, e)))?;
        if !output.status.success() {
            return Err(LeaseError::Ocr(format!(
                "{} failed on page {}: {}",
                self.command,
                page_number,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let png = prefix.with_extension("png");
        let image = image::open(&png);
        // Rasters are not kept between pages
        let _ = std::fs::remove_file(&png);
        Ok(image?)
    }
}

/// Recognizes text with the `tesseract` binary
pub struct TesseractRecognizer {
    command: String,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn is_available(&self) -> bool {
        command_available(&self.command, "--version")
    }

    fn recognize(&self, page_index: usize, image: &GrayImage, psm: u8) -> Result<String> {
        let file = tempfile::Builder::new()
            .prefix(&format!("ocr-page-{}-", page_index + 1))
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| LeaseError::Image(format!("Failed to write page raster: {}", e)))?;

        let output = Command::new(&self.command)
            .arg(file.path())
            .arg("stdout")
            .arg("--psm")
            .arg(psm.to_string())
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| LeaseError::Ocr(format!("Failed to run {}: {}", self.command, e)))?;
        if !output.status.success() {
            return Err(LeaseError::Ocr(format!(
                "{} failed on page {}: {}",
                self.command,
                page_index + 1,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use imageproc::drawing::draw_line_segment_mut;
    use std::sync::Mutex;
    use std::time::Duration;

    struct BlankRenderer {
        pages: usize,
    }

    impl PageRenderer for BlankRenderer {
        fn is_available(&self) -> bool {
            true
        }
        fn page_count(&self, _pdf: &Path) -> Result<usize> {
            Ok(self.pages)
        }
        fn render(&self, _pdf: &Path, _page: usize, _dpi: u32, _scratch: &Path) -> Result<DynamicImage> {
            Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([255]))))
        }
    }

    /// Later pages finish first
    struct ReverseRecognizer {
        pages: usize,
        completed: Mutex<Vec<usize>>,
    }

    impl TextRecognizer for ReverseRecognizer {
        fn is_available(&self) -> bool {
            true
        }
        fn recognize(&self, page_index: usize, _image: &GrayImage, _psm: u8) -> Result<String> {
            let delay = (self.pages - page_index) as u64 * 40;
            std::thread::sleep(Duration::from_millis(delay));
            if let Ok(mut completed) = self.completed.lock() {
                completed.push(page_index);
            }
            Ok(format!(
                "Page {} text recognized from the scanned lease body content.",
                page_index + 1
            ))
        }
    }

    /// Short output in the primary mode, longer in the secondary mode
    struct ModeSensitiveRecognizer {
        calls: Mutex<Vec<u8>>,
    }

    impl TextRecognizer for ModeSensitiveRecognizer {
        fn is_available(&self) -> bool {
            true
        }
        fn recognize(&self, _page_index: usize, _image: &GrayImage, psm: u8) -> Result<String> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(psm);
            }
            if psm == 6 {
                Ok("12 ;".to_string())
            } else {
                Ok("THE TENANT SHALL KEEP THE PREMISES IN GOOD REPAIR AT ALL TIMES.".to_string())
            }
        }
    }

    struct Unavailable;

    impl TextRecognizer for Unavailable {
        fn is_available(&self) -> bool {
            false
        }
        fn recognize(&self, _: usize, _: &GrayImage, _: u8) -> Result<String> {
            Err(LeaseError::Ocr("not installed".to_string()))
        }
    }

    #[test]
    fn test_pages_reassembled_in_page_order() {
        let config = OcrConfig {
            workers: 5,
            ..OcrConfig::default()
        };
        let recognizer = ReverseRecognizer {
            pages: 5,
            completed: Mutex::new(Vec::new()),
        };
        let strategy = OcrStrategy::new(
            config,
            800,
            Box::new(BlankRenderer { pages: 5 }),
            Box::new(recognizer),
        );

        let pages = strategy.extract(Path::new("scan.pdf")).unwrap();
        assert_eq!(pages.len(), 5);
        for (i, page) in pages.iter().enumerate() {
            assert!(page.starts_with(&format!("Page {} ", i + 1)));
        }
    }

    #[test]
    fn test_secondary_mode_retry_keeps_longer_text() {
        let recognizer = ModeSensitiveRecognizer {
            calls: Mutex::new(Vec::new()),
        };
        let strategy = OcrStrategy::new(
            OcrConfig::default(),
            800,
            Box::new(BlankRenderer { pages: 1 }),
            Box::new(recognizer),
        );
        let pages = strategy.recognize_pages(Path::new("scan.pdf")).unwrap();
        assert!(pages[0].starts_with("THE TENANT SHALL"));
    }

    #[test]
    fn test_unavailable_engine_is_an_error() {
        let strategy = OcrStrategy::new(
            OcrConfig::default(),
            800,
            Box::new(BlankRenderer { pages: 2 }),
            Box::new(Unavailable),
        );
        assert!(matches!(
            strategy.extract(Path::new("scan.pdf")),
            Err(LeaseError::Ocr(_))
        ));
    }

    fn skewed_block(degrees: f32) -> GrayImage {
        let mut image = GrayImage::from_pixel(400, 400, Luma([255]));
        let slope = degrees.to_radians().tan();
        for k in 0..40 {
            let y0 = 150.0 + k as f32;
            draw_line_segment_mut(
                &mut image,
                (50.0, y0),
                (350.0, y0 + 300.0 * slope),
                Luma([0u8]),
            );
        }
        image
    }

    #[test]
    fn test_estimate_skew() {
        let angle = estimate_skew(&skewed_block(4.0)).unwrap();
        assert_abs_diff_eq!(angle, 4.0, epsilon = 0.75);

        let angle = estimate_skew(&skewed_block(-3.0)).unwrap();
        assert_abs_diff_eq!(angle, -3.0, epsilon = 0.75);

        let level = estimate_skew(&skewed_block(0.0)).unwrap();
        assert_abs_diff_eq!(level, 0.0, epsilon = 0.2);
    }

    #[test]
    fn test_blank_page_has_no_skew() {
        let blank = GrayImage::from_pixel(50, 50, Luma([255]));
        assert_eq!(estimate_skew(&blank), None);
        assert_eq!(deskew(&blank, 0.1), blank);
    }

    #[test]
    fn test_faded_scan_is_stretched() {
        let faded = GrayImage::from_fn(16, 4, |x, _| Luma([100 + (x as u8) * 3]));
        let stretched = stretch_to_full_range(&faded);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
        assert_eq!(stretched.get_pixel(15, 0)[0], 255);
        assert!(stretched.get_pixel(8, 0)[0] > 100 && stretched.get_pixel(8, 0)[0] < 160);

        let flat = GrayImage::from_pixel(8, 8, Luma([180]));
        assert_eq!(stretch_to_full_range(&flat), flat);
    }

    #[test]
    fn test_preprocess_keeps_dimensions() {
        let image = DynamicImage::ImageLuma8(skewed_block(2.0));
        let prepared = preprocess_page(&image, &OcrConfig::default());
        assert_eq!(prepared.dimensions(), (400, 400));
    }
}
