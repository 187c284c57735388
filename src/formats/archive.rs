//! Archive-backed reader for CBZ, CBR, CB7 and CBT

use std::sync::Arc;

use async_trait::async_trait;

use super::entries::{is_image_entry, order_pages};
use super::session::SessionSlot;
use super::store::{Extraction, PageStore};
use super::workspace::TempWorkspace;
use super::zip::ZipStore;
use super::{rar, sevenz, tar, ReaderSettings};
use crate::imaging::decode_with_budget;
use crate::reader::{
    BookReader, ContainerKind, OpenError, OpenResult, PageEntry, RenderError, RenderResult,
    RenderTarget, SharedImage, SourceHandle, SourceId,
};

struct OpenArchive {
    source: SourceHandle,
    pages: Vec<PageEntry>,
    store: PageStore,
}

/// Reader over image entries of an archive container
pub struct ArchiveReader {
    kind: ContainerKind,
    settings: ReaderSettings,
    session: SessionSlot<OpenArchive>,
}

impl ArchiveReader {
    pub fn new(kind: ContainerKind, settings: ReaderSettings) -> Self {
        Self {
            kind,
            settings,
            session: SessionSlot::default(),
        }
    }

    /// Workspace directory of the open source, for kinds that extract
    pub fn workspace_path(&self) -> Option<std::path::PathBuf> {
        let state = self.session.get()?;
        state.store.workspace_path().map(|p| p.to_path_buf())
    }
}

/// Enumerate and, where needed, extract. Runs on a blocking thread.
fn open_archive(
    kind: ContainerKind,
    source: &SourceHandle,
    settings: &ReaderSettings,
) -> OpenResult<(Vec<PageEntry>, PageStore)> {
    let path = source.path();

    let (mut pages, store) = match kind {
        ContainerKind::Zip => {
            let store = ZipStore::open(path)?;
            let pages = store.page_entries(is_image_entry, settings.max_entry_bytes);
            let store = PageStore::Zip {
                store,
                max_entry_bytes: settings.max_entry_bytes,
            };
            (pages, store)
        }
        ContainerKind::Rar | ContainerKind::SevenZip | ContainerKind::Tar => {
            // Dropping the extraction on error removes the workspace
            let extraction = Extraction::new(
                TempWorkspace::create(&settings.temp_root)?,
                settings.max_entry_bytes,
            );
            let extraction = match kind {
                ContainerKind::Rar => rar::extract(path, extraction)?,
                ContainerKind::SevenZip => sevenz::extract(path, extraction)?,
                _ => tar::extract(path, extraction)?,
            };
            extraction.finish()
        }
        ContainerKind::Pdf | ContainerKind::Epub => {
            return Err(OpenError::UnsupportedFormat(kind.to_string()))
        }
    };

    if pages.is_empty() {
        store.release();
        return Err(OpenError::NoReadablePages(path.display().to_string()));
    }

    order_pages(&mut pages);
    Ok((pages, store))
}

#[async_trait]
impl BookReader for ArchiveReader {
    async fn open(&self, source: &SourceHandle) -> OpenResult<usize> {
        if source.kind() != self.kind {
            return Err(OpenError::UnsupportedFormat(source.kind().to_string()));
        }

        let kind = self.kind;
        let task_source = source.clone();
        let settings = self.settings.clone();
        let (pages, store) = tokio::task::spawn_blocking(move || open_archive(kind, &task_source, &settings))
            .await
            .map_err(|e| OpenError::CorruptArchive(format!("extraction task failed: {e}")))??;

        let page_count = pages.len();
        tracing::info!(path = %source.path().display(), kind = %kind, pages = page_count, "archive opened");

        let previous = self.session.install(Arc::new(OpenArchive {
            source: source.clone(),
            pages,
            store,
        }));
        if let Some(previous) = previous {
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

        let limits = self.settings.decode;
        tokio::task::spawn_blocking(move || {
            let page = &state.pages[index];
            let bytes = state.store.read(page)?;
            let image = decode_with_budget(&bytes, target, limits).map_err(|e| {
                tracing::warn!(entry = %page.name, index, error = %e, "page decode failed");
                RenderError::decode(index, e)
            })?;
            Ok(Arc::new(image))
        })
        .await
        .map_err(|e| RenderError::decode(index, format!("decode task failed: {e}")))?
    }

    async fn close(&self) {
        let Some(state) = self.session.close() else {
            return;
        };
        let path = state.source.path().display().to_string();
        let released = tokio::task::spawn_blocking(move || state.store.release()).await;
        if let Err(e) = released {
            tracing::warn!(path = %path, error = %e, "archive release task failed");
        }
        tracing::info!(path = %path, kind = %self.kind, "archive closed");
    }

    fn kind(&self) -> ContainerKind {
        self.kind
    }

    fn source_id(&self) -> Option<SourceId> {
        self.session.get().map(|state| state.source.id().clone())
    }

    fn entry_name(&self, index: usize) -> Option<String> {
        let state = self.session.get()?;
        state.pages.get(index).map(|page| page.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::{Cursor, Write};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([5, 6, 7])))
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn write_tar(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let mut builder = ::tar::Builder::new(std::fs::File::create(path).unwrap());
        for (name, data) in entries {
            let mut header = ::tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_slice()).unwrap();
        }
        builder.finish().unwrap();
    }

    fn settings(root: &Path) -> ReaderSettings {
        ReaderSettings {
            temp_root: root.to_path_buf(),
            ..ReaderSettings::default()
        }
    }

    fn workspaces(root: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(root)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect()
    }

    #[tokio::test]
    async fn test_tar_extracts_and_orders() {
        let dir = TempDir::new().unwrap();
        let temp_root = dir.path().join("tmp");
        let path = dir.path().join("book.cbt");
        write_tar(
            &path,
            &[
                ("Z.png", png(4, 4)),
                ("readme.txt", b"hi".to_vec()),
                ("a.PNG", png(8, 2)),
            ],
        );

        let reader = ArchiveReader::new(ContainerKind::Tar, settings(&temp_root));
        let count = reader.open(&SourceHandle::new(&path).unwrap()).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(reader.entry_name(0).as_deref(), Some("a.PNG"));
        assert_eq!(reader.entry_name(1).as_deref(), Some("Z.png"));

        let page = reader.render_page(0, RenderTarget::square(64)).await.unwrap();
        assert_eq!((page.width(), page.height()), (8, 2));

        let workspace = reader.workspace_path().unwrap();
        assert!(workspace.exists());
        reader.close().await;
        assert!(!workspace.exists());
        assert!(workspaces(&temp_root).is_empty());
    }

    #[tokio::test]
    async fn test_tar_without_images_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let temp_root = dir.path().join("tmp");
        let path = dir.path().join("notes.cbt");
        write_tar(&path, &[("notes.txt", b"no pages".to_vec())]);

        let reader = ArchiveReader::new(ContainerKind::Tar, settings(&temp_root));
        let err = reader.open(&SourceHandle::new(&path).unwrap()).await.unwrap_err();
        assert!(matches!(err, OpenError::NoReadablePages(_)));
        assert!(workspaces(&temp_root).is_empty());
        assert!(matches!(
            reader.render_page(0, RenderTarget::default()).await,
            Err(RenderError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_bad_page_does_not_end_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.cbz");
        let mut writer = ::zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        writer.start_file("01.png", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"corrupted bytes").unwrap();
        writer.start_file("02.png", SimpleFileOptions::default()).unwrap();
        writer.write_all(&png(3, 3)).unwrap();
        writer.finish().unwrap();

        let reader = ArchiveReader::new(ContainerKind::Zip, settings(dir.path()));
        assert_eq!(reader.open(&SourceHandle::new(&path).unwrap()).await.unwrap(), 2);

        let err = reader.render_page(0, RenderTarget::default()).await.unwrap_err();
        assert!(matches!(err, RenderError::DecodeFailure { index: 0, .. }));
        assert!(reader.render_page(1, RenderTarget::default()).await.is_ok());

        assert!(matches!(
            reader.render_page(2, RenderTarget::default()).await,
            Err(RenderError::IndexOutOfRange { index: 2, page_count: 2 })
        ));
    }

    #[tokio::test]
    async fn test_close_twice_then_render() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.cbt");
        write_tar(&path, &[("1.png", png(2, 2))]);

        let reader = ArchiveReader::new(ContainerKind::Tar, settings(dir.path()));
        reader.open(&SourceHandle::new(&path).unwrap()).await.unwrap();
        reader.close().await;
        reader.close().await;

        assert!(!reader.is_open());
        assert_eq!(reader.page_count(), 0);
        assert!(matches!(
            reader.render_page(0, RenderTarget::default()).await,
            Err(RenderError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected() {
        let reader = ArchiveReader::new(ContainerKind::Zip, ReaderSettings::default());
        let source = SourceHandle::new("/nowhere/book.cbt").unwrap();
        assert!(matches!(
            reader.open(&source).await,
            Err(OpenError::UnsupportedFormat(_))
        ));
    }
}
