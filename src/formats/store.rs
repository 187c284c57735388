//! Page byte stores behind the archive reader

use std::path::{Path, PathBuf};

use super::entries::{entry_extension, is_image_entry, page_entry};
use super::workspace::TempWorkspace;
use super::zip::ZipStore;
use crate::reader::{OpenResult, PageEntry, RenderError, RenderResult};

/// Where page bytes come from once a container is open
pub enum PageStore {
    /// Read from the zip central directory on demand
    Zip { store: ZipStore, max_entry_bytes: u64 },
    /// Pre-extracted into a temp workspace
    Extracted(ExtractedStore),
}

impl PageStore {
    pub fn read(&self, page: &PageEntry) -> RenderResult<Vec<u8>> {
        match self {
            PageStore::Zip {
                store,
                max_entry_bytes,
            } => store.read_index(page.slot, *max_entry_bytes),
            PageStore::Extracted(store) => store.read(page.slot),
        }
    }

    /// Release file handles and delete extracted files
    pub fn release(&self) {
        match self {
            PageStore::Zip { store, .. } => store.release(),
            PageStore::Extracted(store) => store.workspace.release(),
        }
    }

    pub fn workspace_path(&self) -> Option<&Path> {
        match self {
            PageStore::Zip { .. } => None,
            PageStore::Extracted(store) => Some(store.workspace.path()),
        }
    }
}

/// Extracted page files, indexed by slot
pub struct ExtractedStore {
    workspace: TempWorkspace,
    files: Vec<PathBuf>,
}

impl ExtractedStore {
    fn read(&self, slot: usize) -> RenderResult<Vec<u8>> {
        let file = self
            .files
            .get(slot)
            .ok_or_else(|| RenderError::TempStorageFailure(format!("no extracted file for slot {slot}")))?;
        self.workspace.read(file)
    }
}

/// Collects page images while a sequential container is walked
pub struct Extraction {
    workspace: TempWorkspace,
    max_entry_bytes: u64,
    pages: Vec<PageEntry>,
    files: Vec<PathBuf>,
}

impl Extraction {
    pub fn new(workspace: TempWorkspace, max_entry_bytes: u64) -> Self {
        Self {
            workspace,
            max_entry_bytes,
            pages: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Whether an entry with this name and declared size should be read
    pub fn wants(&self, name: &str, declared_size: u64) -> bool {
        if !is_image_entry(name) {
            return false;
        }
        if declared_size > self.max_entry_bytes {
            tracing::warn!(entry = %name, bytes = declared_size, "skipping oversized entry");
            return false;
        }
        true
    }

    pub fn max_entry_bytes(&self) -> u64 {
        self.max_entry_bytes
    }

    /// Write one page image into the workspace
    pub fn accept(&mut self, name: &str, data: &[u8]) -> OpenResult<()> {
        let slot = self.files.len();
        let extension = entry_extension(name).unwrap_or_else(|| "bin".to_string());
        let file = self.workspace.write_slot(slot, &extension, data)?;
        self.files.push(file);
        self.pages.push(page_entry(name, slot, data.len() as u64));
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn finish(self) -> (Vec<PageEntry>, PageStore) {
        let store = ExtractedStore {
            workspace: self.workspace,
            files: self.files,
        };
        (self.pages, PageStore::Extracted(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extraction_round_trip() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::create(root.path()).unwrap();
        let mut extraction = Extraction::new(workspace, 1024);

        assert!(extraction.wants("../../etc/evil.png", 10));
        assert!(!extraction.wants("readme.txt", 10));
        assert!(!extraction.wants("huge.png", 4096));

        extraction.accept("../../etc/evil.png", b"pixels").unwrap();
        let (pages, store) = extraction.finish();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].name, "../../etc/evil.png");
        let workspace = store.workspace_path().unwrap().to_path_buf();
        assert!(workspace.join("00000.png").exists());
        assert_eq!(store.read(&pages[0]).unwrap(), b"pixels");

        store.release();
        assert!(!workspace.exists());
        assert!(matches!(store.read(&pages[0]), Err(RenderError::Closed)));
    }
}
