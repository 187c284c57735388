//! ZIP container access (CBZ and EPUB)
//!
//! ZIP has a central directory, so entries are read on demand by index
//! and nothing is extracted to disk.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use parking_lot::Mutex;
use zip::result::ZipError;
use zip::ZipArchive;

use super::entries::page_entry;
use crate::reader::{OpenError, OpenResult, PageEntry, RenderError, RenderResult};

/// Directory record kept for every readable entry
#[derive(Debug, Clone)]
struct ZipEntryInfo {
    index: usize,
    name: String,
    size: u64,
}

/// Random-access ZIP reader
pub struct ZipStore {
    archive: Mutex<Option<ZipArchive<BufReader<File>>>>,
    entries: Vec<ZipEntryInfo>,
    names: Vec<String>,
}

impl ZipStore {
    /// Open the archive and list its file entries
    ///
    /// Entries whose header cannot be read are skipped with a warning.
    pub fn open(path: &Path) -> OpenResult<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| match e {
            ZipError::Io(io) => OpenError::Io(io),
            other => OpenError::CorruptArchive(other.to_string()),
        })?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            match archive.by_index_raw(index) {
                Ok(file) if file.is_dir() => {}
                Ok(file) => entries.push(ZipEntryInfo {
                    index,
                    name: file.name().to_string(),
                    size: file.size(),
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), index, error = %e, "skipping unreadable zip entry");
                }
            }
        }
        let names = entries.iter().map(|e| e.name.clone()).collect();

        Ok(Self {
            archive: Mutex::new(Some(archive)),
            entries,
            names,
        })
    }

    /// File entry names in directory order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Entries accepted by `is_page` and not larger than `max_entry_bytes`,
    /// with `slot` set to the zip index
    pub fn page_entries(&self, is_page: impl Fn(&str) -> bool, max_entry_bytes: u64) -> Vec<PageEntry> {
        self.entries
            .iter()
            .filter(|entry| is_page(&entry.name))
            .filter(|entry| {
                let fits = entry.size <= max_entry_bytes;
                if !fits {
                    tracing::warn!(entry = %entry.name, bytes = entry.size, "skipping oversized entry");
                }
                fits
            })
            .map(|entry| page_entry(entry.name.clone(), entry.index, entry.size))
            .collect()
    }

    /// Read the entry at zip `index`
    pub fn read_index(&self, index: usize, max_entry_bytes: u64) -> RenderResult<Vec<u8>> {
        let mut guard = self.archive.lock();
        let archive = guard.as_mut().ok_or(RenderError::Closed)?;

        let file = archive.by_index(index).map_err(|e| zip_read_error(index, e))?;
        let mut data = Vec::with_capacity(file.size().min(max_entry_bytes) as usize);
        file.take(max_entry_bytes.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| RenderError::decode(index, e))?;

        if data.len() as u64 > max_entry_bytes {
            return Err(RenderError::decode(index, "entry exceeds size limit"));
        }
        Ok(data)
    }

    /// Zip index of the entry named exactly `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.index)
    }

    /// Drop the file handle; later reads fail with `Closed`
    pub fn release(&self) {
        self.archive.lock().take();
    }
}

fn zip_read_error(index: usize, err: ZipError) -> RenderError {
    match err {
        ZipError::Io(io) => RenderError::Io(io),
        other => RenderError::decode(index, other),
    }
}
