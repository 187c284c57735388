//! TAR extraction (CBT)

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::store::Extraction;
use crate::reader::{OpenError, OpenResult};

/// Walk the archive once, copying page images into the workspace
pub fn extract(path: &Path, mut extraction: Extraction) -> OpenResult<Extraction> {
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(BufReader::new(file));
    let entries = archive
        .entries()
        .map_err(|e| OpenError::CorruptArchive(e.to_string()))?;

    let mut seen = 0usize;
    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) if seen == 0 => return Err(OpenError::CorruptArchive(e.to_string())),
            Err(e) => {
                // Headers are sequential; nothing after a bad one is reachable
                tracing::warn!(path = %path.display(), error = %e, "tar walk stopped early");
                break;
            }
        };
        seen += 1;

        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = match entry.path() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping tar entry with bad name");
                continue;
            }
        };
        if !extraction.wants(&name, entry.size()) {
            continue;
        }

        let mut data = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = (&mut entry)
            .take(extraction.max_entry_bytes())
            .read_to_end(&mut data)
        {
            tracing::warn!(entry = %name, error = %e, "skipping unreadable tar entry");
            continue;
        }
        extraction.accept(&name, &data)?;
    }

    Ok(extraction)
}
