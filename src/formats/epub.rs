//! EPUB reader
//!
//! Every XHTML/HTML entry is a page, in sorted entry-name order. A page
//! that references an image is rendered from that image; a text-only
//! page is laid out and rasterized by MuPDF.

use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::entries::{find_matching_entry, is_image_entry, is_page_document, order_pages, resolve_href, sort_key};
use super::session::SessionSlot;
use super::zip::ZipStore;
use super::ReaderSettings;
use crate::imaging::decode_with_budget;
use crate::mupdf::{rasterize_markup, DocumentSource, SafeDocument, XHTML_MAGIC};
use crate::reader::{
    BookReader, ContainerKind, DecodedImage, OpenError, OpenResult, PageEntry, RenderError,
    RenderResult, RenderTarget, SharedImage, SourceHandle, SourceId,
};

struct OpenEpub {
    source: SourceHandle,
    store: ZipStore,
    pages: Vec<PageEntry>,
    cover: Option<String>,
}

pub struct EpubReader {
    settings: ReaderSettings,
    session: SessionSlot<OpenEpub>,
}

impl EpubReader {
    pub fn new(settings: ReaderSettings) -> Self {
        Self {
            settings,
            session: SessionSlot::default(),
        }
    }

    /// Entry name of the cover image chosen at open time
    pub fn cover(&self) -> Option<String> {
        self.session.get().and_then(|state| state.cover.clone())
    }

    /// Decode the cover image
    ///
    /// `Ok(None)` when the book has no cover candidate.
    pub async fn render_cover(&self, target: RenderTarget) -> RenderResult<Option<SharedImage>> {
        let state = self.session.current()?;
        let Some(cover) = state.cover.clone() else {
            return Ok(None);
        };

        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || {
            let index = state
                .store
                .index_of(&cover)
                .ok_or_else(|| RenderError::decode(0, format!("cover entry {cover} vanished")))?;
            let bytes = state.store.read_index(index, settings.max_entry_bytes)?;
            let image = decode_with_budget(&bytes, target, settings.decode)
                .map_err(|e| RenderError::decode(0, e))?;
            Ok(Some(Arc::new(image)))
        })
        .await
        .map_err(|e| RenderError::decode(0, format!("cover task failed: {e}")))?
    }
}

/// Pick the cover: first image whose name mentions "cover", else the
/// first image in page order
fn select_cover(names: &[String]) -> Option<String> {
    let mut images: Vec<&String> = names.iter().filter(|name| is_image_entry(name)).collect();
    images.sort_by_key(|name| sort_key(name));

    images
        .iter()
        .find(|name| name.to_lowercase().contains("cover"))
        .or_else(|| images.first())
        .map(|name| (*name).clone())
}

/// First `<img src>` or SVG `<image href>` in a page
fn first_image_reference(markup: &str) -> Option<String> {
    let mut reader = Reader::from_str(markup);
    reader.check_end_names(false);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let wanted: &[u8] = match e.local_name().as_ref() {
                    b"img" => b"src",
                    b"image" => b"href",
                    _ => continue,
                };
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == wanted {
                        let value = attr
                            .unescape_value()
                            .map(|v| v.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                        if !value.trim().is_empty() {
                            return Some(value);
                        }
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "stopped scanning page markup");
                return None;
            }
            _ => {}
        }
    }
}

fn open_epub(source: &SourceHandle, settings: &ReaderSettings) -> OpenResult<OpenEpub> {
    let store = ZipStore::open(source.path())?;
    let mut pages = store.page_entries(is_page_document, settings.max_entry_bytes);
    if pages.is_empty() {
        store.release();
        return Err(OpenError::NoReadablePages(source.path().display().to_string()));
    }
    order_pages(&mut pages);

    let cover = select_cover(store.names());
    match &cover {
        Some(cover) => tracing::debug!(path = %source.path().display(), entry = %cover, "epub cover selected"),
        None => tracing::warn!(path = %source.path().display(), "epub has no cover image"),
    }

    Ok(OpenEpub {
        source: source.clone(),
        store,
        pages,
        cover,
    })
}

fn render_epub_page(
    state: &OpenEpub,
    index: usize,
    target: RenderTarget,
    settings: &ReaderSettings,
) -> RenderResult<DecodedImage> {
    let page = &state.pages[index];
    let markup = state.store.read_index(page.slot, settings.max_entry_bytes)?;
    let image_entry = first_image_reference(&String::from_utf8_lossy(&markup))
        .and_then(|href| resolve_href(&page.name, &href))
        .and_then(|wanted| find_matching_entry(state.store.names(), &wanted).cloned());

    if let Some(entry) = image_entry {
        let slot = state
            .store
            .index_of(&entry)
            .ok_or_else(|| RenderError::decode(index, format!("missing entry {entry}")))?;
        let bytes = state
            .store
            .read_index(slot, settings.max_entry_bytes)
            .map_err(|e| match e {
                RenderError::Closed => RenderError::Closed,
                other => RenderError::decode(index, other),
            })?;
        return decode_with_budget(&bytes, target, settings.decode).map_err(|e| {
            tracing::warn!(entry = %entry, index, error = %e, "epub image decode failed");
            RenderError::decode(index, e)
        });
    }

    let doc = SafeDocument::open(DocumentSource::from_bytes(markup, XHTML_MAGIC))
        .map_err(|e| RenderError::decode(index, e))?;
    doc.with_doc_mut(|doc| rasterize_markup(doc, target, settings.decode.max_alloc))
        .map_err(|e| {
            tracing::warn!(entry = %page.name, index, error = %e, "epub page rasterization failed");
            RenderError::decode(index, e)
        })
}

#[async_trait]
impl BookReader for EpubReader {
    async fn open(&self, source: &SourceHandle) -> OpenResult<usize> {
        if source.kind() != ContainerKind::Epub {
            return Err(OpenError::UnsupportedFormat(source.kind().to_string()));
        }

        let task_source = source.clone();
        let settings = self.settings.clone();
        let state = tokio::task::spawn_blocking(move || open_epub(&task_source, &settings))
            .await
            .map_err(|e| OpenError::CorruptArchive(format!("open task failed: {e}")))??;

        let page_count = state.pages.len();
        tracing::info!(path = %source.path().display(), kind = "epub", pages = page_count, "epub opened");

        if let Some(previous) = self.session.install(Arc::new(state)) {
            previous.store.release();
        }
        Ok(page_count)
    }

    fn page_count(&self) -> usize {
        self.session.get().map(|state| state.pages.len()).unwrap_or(0)
    }

    async fn render_page(&self, index: usize, target: RenderTarget) -> RenderResult<SharedImage> {
        let state = self.session.current()?;
        if index >= state.pages.len() {
            return Err(RenderError::IndexOutOfRange {
                index: index as i64,
                page_count: state.pages.len(),
            });
        }

        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || render_epub_page(&state, index, target, &settings).map(Arc::new))
            .await
            .map_err(|e| RenderError::decode(index, format!("render task failed: {e}")))?
    }

    async fn close(&self) {
        if let Some(state) = self.session.close() {
            state.store.release();
            tracing::info!(path = %state.source.path().display(), kind = "epub", "epub closed");
        }
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Epub
    }

    fn source_id(&self) -> Option<SourceId> {
        self.session.get().map(|state| state.source.id().clone())
    }

    fn entry_name(&self, index: usize) -> Option<String> {
        let state = self.session.get()?;
        state.pages.get(index).map(|page| page.name.clone())
    }
}
