//! RAR extraction (CBR)
//!
//! unrar processes entries strictly in order, so page images are copied
//! into the workspace during open.

use std::path::Path;

use unrar::Archive;

use super::store::Extraction;
use crate::reader::{OpenError, OpenResult};

/// Walk the archive once, copying page images into the workspace
pub fn extract(path: &Path, mut extraction: Extraction) -> OpenResult<Extraction> {
    let mut archive = Archive::new(path)
        .open_for_processing()
        .map_err(|e| OpenError::CorruptArchive(e.to_string()))?;

    let mut seen = 0usize;
    loop {
        let header = match archive.read_header() {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(e) if seen == 0 => return Err(OpenError::CorruptArchive(e.to_string())),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "rar walk stopped early");
                break;
            }
        };
        seen += 1;

        let entry = header.entry();
        let name = entry.filename.to_string_lossy().into_owned();
        let wanted = entry.is_file() && extraction.wants(&name, entry.unpacked_size as u64);

        archive = if wanted {
            match header.read() {
                Ok((data, next)) => {
                    extraction.accept(&name, &data)?;
                    next
                }
                Err(e) => {
                    // The archive handle is consumed by the failed read
                    tracing::warn!(entry = %name, error = %e, "rar walk stopped at unreadable entry");
                    break;
                }
            }
        } else {
            match header.skip() {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(entry = %name, error = %e, "rar walk stopped early");
                    break;
                }
            }
        };
    }

    Ok(extraction)
}
