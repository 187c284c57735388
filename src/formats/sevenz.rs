//! 7z extraction (CB7)
//!
//! Solid 7z blocks can only be decoded front to back, so page images are
//! copied into the workspace during open.

use std::io::{self, Read};
use std::path::Path;

use sevenz_rust::{Password, SevenZReader};

use super::store::Extraction;
use crate::reader::{OpenError, OpenResult};

/// Walk the archive once, copying page images into the workspace
pub fn extract(path: &Path, mut extraction: Extraction) -> OpenResult<Extraction> {
    let mut reader = SevenZReader::open(path, Password::empty())
        .map_err(|e| OpenError::CorruptArchive(e.to_string()))?;

    let mut write_error: Option<OpenError> = None;
    let walk = reader.for_each_entries(|entry, data| {
        let name = entry.name.clone();
        if entry.is_directory || !extraction.wants(&name, entry.size) {
            io::copy(data, &mut io::sink())?;
            return Ok(true);
        }

        if let Err(e) = copy_entry(&mut extraction, &name, data) {
            write_error = Some(e);
            return Ok(false);
        }
        Ok(true)
    });

    if let Some(e) = write_error {
        return Err(e);
    }
    if let Err(e) = walk {
        if extraction.page_count() == 0 {
            return Err(OpenError::CorruptArchive(e.to_string()));
        }
        tracing::warn!(path = %path.display(), error = %e, "7z walk stopped early");
    }

    Ok(extraction)
}

/// Copy one page entry into the workspace
///
/// A damaged entry is skipped so the rest of the book still opens; only
/// workspace write failures are returned.
fn copy_entry(extraction: &mut Extraction, name: &str, data: &mut dyn Read) -> OpenResult<()> {
    let mut bytes = Vec::new();
    if let Err(e) = data.take(extraction.max_entry_bytes()).read_to_end(&mut bytes) {
        tracing::warn!(entry = %name, error = %e, "skipping unreadable 7z entry");
        return Ok(());
    }
    extraction.accept(name, &bytes)
}
