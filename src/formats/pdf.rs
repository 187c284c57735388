//! PDF reader
//!
//! Pages are rasterized by MuPDF at the requested bounds; there are no
//! container entries involved.

use std::sync::Arc;

use async_trait::async_trait;

use super::session::SessionSlot;
use super::ReaderSettings;
use crate::mupdf::{render_page_to_fit, SafeDocument};
use crate::reader::{
    BookReader, ContainerKind, OpenError, OpenResult, RenderError, RenderResult, RenderTarget,
    SharedImage, SourceHandle, SourceId,
};

struct OpenPdf {
    source: SourceHandle,
    doc: SafeDocument,
}

pub struct PdfReader {
    settings: ReaderSettings,
    session: SessionSlot<OpenPdf>,
}

impl PdfReader {
    pub fn new(settings: ReaderSettings) -> Self {
        Self {
            settings,
            session: SessionSlot::default(),
        }
    }
}

#[async_trait]
impl BookReader for PdfReader {
    async fn open(&self, source: &SourceHandle) -> OpenResult<usize> {
        if source.kind() != ContainerKind::Pdf {
            return Err(OpenError::UnsupportedFormat(source.kind().to_string()));
        }
        if !source.path().exists() {
            return Err(OpenError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", source.path().display()),
            )));
        }

        let path = source.path().to_path_buf();
        let doc = tokio::task::spawn_blocking(move || SafeDocument::from_path(&path))
            .await
            .map_err(|e| OpenError::CorruptArchive(format!("open task failed: {e}")))??;

        let page_count = doc.page_count();
        if page_count == 0 {
            return Err(OpenError::NoReadablePages(source.path().display().to_string()));
        }
        tracing::info!(path = %source.path().display(), kind = "pdf", pages = page_count, "pdf opened");

        self.session.install(Arc::new(OpenPdf {
            source: source.clone(),
            doc,
        }));
        Ok(page_count)
    }

    fn page_count(&self) -> usize {
        self.session.get().map(|state| state.doc.page_count()).unwrap_or(0)
    }

    async fn render_page(&self, index: usize, target: RenderTarget) -> RenderResult<SharedImage> {
        let state = self.session.current()?;
        let page_count = state.doc.page_count();
        if index >= page_count {
            return Err(RenderError::IndexOutOfRange {
                index: index as i64,
                page_count,
            });
        }

        let max_pixel_bytes = self.settings.decode.max_alloc;
        tokio::task::spawn_blocking(move || {
            state
                .doc
                .with_doc(|doc| render_page_to_fit(doc, index, target, max_pixel_bytes))
                .map(Arc::new)
                .map_err(|e| {
                    tracing::warn!(index, error = %e, "pdf page render failed");
                    RenderError::decode(index, e)
                })
        })
        .await
        .map_err(|e| RenderError::decode(index, format!("render task failed: {e}")))?
    }

    async fn close(&self) {
        if let Some(state) = self.session.close() {
            tracing::info!(path = %state.source.path().display(), kind = "pdf", "pdf closed");
        }
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Pdf
    }

    fn source_id(&self) -> Option<SourceId> {
        self.session.get().map(|state| state.source.id().clone())
    }

    fn entry_name(&self, _index: usize) -> Option<String> {
        None
    }
}
