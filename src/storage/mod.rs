//! Per-document working directories
//!
//! Every document lives under `<root>/<doc_id>/`: the uploaded `lease.pdf`, the
//! index snapshot in `index/` and the chunk manifest `chunks.json`.

pub mod manifest;

pub use manifest::ChunkManifest;

use crate::error::{LeaseError, Result};
use crate::ml::search::VectorSearchIndex;
use crate::utils::{document_id, ensure_directory, is_document_id, write_atomic};
use std::path::{Path, PathBuf};

const PDF_FILE: &str = "lease.pdf";
const INDEX_DIR: &str = "index";
const MANIFEST_FILE: &str = "chunks.json";

/// Content-addressed store of uploaded leases and their indexes
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        ensure_directory(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one document; rejects anything that is not a document id
    pub fn document_dir(&self, doc_id: &str) -> Result<PathBuf> {
        if !is_document_id(doc_id) {
            return Err(LeaseError::Storage(format!("Invalid document id: {:?}", doc_id)));
        }
        Ok(self.root.join(doc_id))
    }

    pub fn pdf_path(&self, doc_id: &str) -> Result<PathBuf> {
        Ok(self.document_dir(doc_id)?.join(PDF_FILE))
    }

    pub fn index_dir(&self, doc_id: &str) -> Result<PathBuf> {
        Ok(self.document_dir(doc_id)?.join(INDEX_DIR))
    }

    pub fn manifest_path(&self, doc_id: &str) -> Result<PathBuf> {
        Ok(self.document_dir(doc_id)?.join(MANIFEST_FILE))
    }

    /// Store PDF bytes and return their identity. Bytes already present are not
    /// written again.
    pub fn import_bytes(&self, bytes: &[u8]) -> Result<String> {
        let doc_id = document_id(bytes);
        let pdf = self.pdf_path(&doc_id)?;
        if pdf.is_file() {
            log::debug!("Document {} already stored", doc_id);
        } else {
            write_atomic(&pdf, bytes)?;
            log::info!("Stored document {} ({} bytes)", doc_id, bytes.len());
        }
        Ok(doc_id)
    }

    /// Store a PDF file and return its identity
    pub fn import_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            LeaseError::Storage(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        self.import_bytes(&bytes)
    }

    pub fn has_document(&self, doc_id: &str) -> bool {
        self.pdf_path(doc_id).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Whether an index snapshot exists for the document
    pub fn has_index(&self, doc_id: &str) -> bool {
        self.index_dir(doc_id)
            .map(|dir| VectorSearchIndex::exists(dir))
            .unwrap_or(false)
    }

    /// Delete the snapshot and manifest so the next request rebuilds them.
    /// Returns whether anything was removed. The stored PDF is kept.
    pub fn invalidate(&self, doc_id: &str) -> Result<bool> {
        let mut removed = false;

        let index_dir = self.index_dir(doc_id)?;
        if index_dir.exists() {
            std::fs::remove_dir_all(&index_dir)?;
            removed = true;
        }
        let manifest = self.manifest_path(doc_id)?;
        if manifest.exists() {
            std::fs::remove_file(&manifest)?;
            removed = true;
        }

        if removed {
            log::info!("Invalidated index for document {}", doc_id);
        }
        Ok(removed)
    }

    pub fn save_manifest(&self, manifest: &ChunkManifest) -> Result<()> {
        manifest.save(self.manifest_path(&manifest.doc_id)?)
    }

    pub fn load_manifest(&self, doc_id: &str) -> Result<ChunkManifest> {
        ChunkManifest::load(self.manifest_path(doc_id)?)
    }

    /// Identities of all stored documents
    pub fn list_documents(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_document_id(&name) && entry.path().join(PDF_FILE).is_file() {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
