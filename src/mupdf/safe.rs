//! Thread-safe document wrapper for MuPDF
//!
//! MuPDF documents are not thread-safe. `SafeDocument` keeps only the
//! source (bytes or path), opens a fresh document for each operation
//! and serializes those operations behind a `parking_lot::Mutex`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mupdf::Document;
use parking_lot::Mutex;

/// Source data for a document
#[derive(Clone)]
pub enum DocumentSource {
    /// Owned bytes plus the MuPDF magic (mime type) to open them with
    Bytes { data: Arc<Vec<u8>>, magic: &'static str },
    /// File on disk, format picked from its extension
    Path(PathBuf),
}

impl DocumentSource {
    pub fn from_bytes(data: Vec<u8>, magic: &'static str) -> Self {
        Self::Bytes {
            data: Arc::new(data),
            magic,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }
}

/// Serialized access to one MuPDF document
pub struct SafeDocument {
    source: DocumentSource,
    page_count: usize,
    lock: Mutex<()>,
}

// SAFETY: no MuPDF object is stored in the struct. `source` is plain owned
// data (Arc<Vec<u8>> or PathBuf), every `Document` is created and dropped
// inside `with_doc`/`with_doc_mut` while `lock` is held, and no document
// reference escapes the closure.
unsafe impl Send for SafeDocument {}
unsafe impl Sync for SafeDocument {}

impl SafeDocument {
    /// Open and validate a document, caching its page count
    pub fn open(source: DocumentSource) -> Result<Self, mupdf::Error> {
        let doc = Self::open_document(&source)?;
        let page_count = doc.page_count()?.max(0) as usize;

        Ok(Self {
            source,
            page_count,
            lock: Mutex::new(()),
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, mupdf::Error> {
        Self::open(DocumentSource::from_path(path))
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    fn open_document(source: &DocumentSource) -> Result<Document, mupdf::Error> {
        match source {
            DocumentSource::Bytes { data, magic } => Document::from_bytes(data, magic),
            DocumentSource::Path(path) => {
                let path_str = path.to_string_lossy();
                Document::open(&*path_str)
            }
        }
    }

    /// Run `f` against a freshly opened document
    pub fn with_doc<F, R>(&self, f: F) -> Result<R, mupdf::Error>
    where
        F: FnOnce(&Document) -> Result<R, mupdf::Error>,
    {
        let _guard = self.lock.lock();
        let doc = Self::open_document(&self.source)?;
        f(&doc)
    }

    /// Same as `with_doc` for operations that need `&mut` (layout)
    pub fn with_doc_mut<F, R>(&self, f: F) -> Result<R, mupdf::Error>
    where
        F: FnOnce(&mut Document) -> Result<R, mupdf::Error>,
    {
        let _guard = self.lock.lock();
        let mut doc = Self::open_document(&self.source)?;
        f(&mut doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_source_from_bytes() {
        let source = DocumentSource::from_bytes(vec![1, 2, 3], "application/pdf");
        match source {
            DocumentSource::Bytes { data, magic } => {
                assert_eq!(*data, vec![1, 2, 3]);
                assert_eq!(magic, "application/pdf");
            }
            _ => panic!("Expected Bytes variant"),
        }
    }

    #[test]
    fn test_document_source_from_path() {
        match DocumentSource::from_path("/test/path.pdf") {
            DocumentSource::Path(path) => assert_eq!(path, PathBuf::from("/test/path.pdf")),
            _ => panic!("Expected Path variant"),
        }
    }

    #[test]
    fn test_garbage_fails_to_open() {
        let source = DocumentSource::from_bytes(b"not a pdf at all".to_vec(), "application/pdf");
        assert!(SafeDocument::open(source).is_err());
    }
}
