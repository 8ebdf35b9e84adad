//! Utility functions for lease-rag
//!
//! Hashing, atomic file writes and small text helpers shared across modules.

use crate::error::{LeaseError, Result};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;

/// Content-hash identity of a document
pub fn document_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Whether a string looks like an identity produced by [`document_id`]
pub fn is_document_id(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Create directory if it doesn't exist
pub fn ensure_directory<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        std::fs::create_dir_all(path).map_err(LeaseError::Io)?;
    }

    Ok(())
}

/// Write `data` to `path` through a temporary sibling and a rename, so readers
/// only ever see a complete file.
pub fn write_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = path
        .parent()
        .ok_or_else(|| LeaseError::Storage(format!("No parent directory for {}", path.display())))?;
    ensure_directory(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| LeaseError::Storage(format!("Failed to persist {}: {}", path.display(), e)))?;
    Ok(())
}

/// Collapse runs of whitespace into single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Number of non-whitespace characters
pub fn content_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Get file extension from path
pub fn get_file_extension<P: AsRef<Path>>(path: P) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_document_id_is_stable() {
        let a = document_id(b"%PDF-1.5 lease");
        let b = document_id(b"%PDF-1.5 lease");
        let c = document_id(b"%PDF-1.5 other lease");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(is_document_id(&a));
        assert!(!is_document_id("latest"));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("file.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Page\t 3 \n of  10 "), "Page 3 of 10");
        assert_eq!(content_chars(" a b\nc "), 3);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(get_file_extension("lease.PDF"), Some("pdf".to_string()));
        assert_eq!(get_file_extension("lease"), None);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
    }
}
