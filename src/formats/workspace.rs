//! Temp extraction workspaces
//!
//! Containers without random access are unpacked into one directory per
//! open attempt. Files are named after their slot (`00000.png`), never
//! after the archive entry, so entry names cannot point outside the
//! workspace.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::reader::{OpenError, OpenResult, RenderError, RenderResult};

/// Prefix of every workspace directory
pub const WORKSPACE_PREFIX: &str = "amnesia-comics-";

/// Workspaces untouched for this long are considered abandoned
pub const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// A directory that lives until `release` or drop
pub struct TempWorkspace {
    dir: Mutex<Option<TempDir>>,
    path: PathBuf,
}

impl TempWorkspace {
    pub fn create(root: &Path) -> OpenResult<Self> {
        fs::create_dir_all(root).map_err(|e| {
            OpenError::TempStorageFailure(format!("cannot create {}: {}", root.display(), e))
        })?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(|e| {
                OpenError::TempStorageFailure(format!("cannot create workspace in {}: {}", root.display(), e))
            })?;
        let path = dir.path().to_path_buf();
        tracing::debug!(path = %path.display(), "workspace created");

        Ok(Self {
            dir: Mutex::new(Some(dir)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one extracted entry under its slot name
    pub fn write_slot(&self, slot: usize, extension: &str, bytes: &[u8]) -> OpenResult<PathBuf> {
        let file = self.path.join(format!("{slot:05}.{extension}"));
        fs::write(&file, bytes).map_err(|e| {
            OpenError::TempStorageFailure(format!("cannot write {}: {}", file.display(), e))
        })?;
        Ok(file)
    }

    /// Read an extracted entry back
    pub fn read(&self, file: &Path) -> RenderResult<Vec<u8>> {
        if self.is_released() {
            return Err(RenderError::Closed);
        }
        fs::read(file).map_err(|e| {
            if self.is_released() {
                RenderError::Closed
            } else {
                RenderError::TempStorageFailure(format!("cannot read {}: {}", file.display(), e))
            }
        })
    }

    pub fn is_released(&self) -> bool {
        self.dir.lock().is_none()
    }

    /// Delete the directory now. Safe to call more than once.
    pub fn release(&self) {
        let Some(dir) = self.dir.lock().take() else {
            return;
        };
        match dir.close() {
            Ok(()) => tracing::debug!(path = %self.path.display(), "workspace removed"),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove workspace")
            }
        }
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        self.release();
    }
}

/// Remove workspace directories under `root` older than `older_than`
///
/// Returns the number of directories removed. Errors are logged.
pub fn sweep_stale_workspaces(root: &Path, older_than: Duration) -> usize {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(root = %root.display(), error = %e, "workspace sweep skipped");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(WORKSPACE_PREFIX) {
            continue;
        }

        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_dir() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < older_than {
            continue;
        }

        match fs::remove_dir_all(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "failed to remove stale workspace")
            }
        }
    }

    if removed > 0 {
        tracing::info!(root = %root.display(), removed, "removed stale workspaces");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_stay_inside_workspace() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::create(root.path()).unwrap();

        let file = workspace.write_slot(7, "png", b"data").unwrap();
        assert_eq!(file.parent(), Some(workspace.path()));
        assert_eq!(file.file_name().unwrap(), "00007.png");
        assert_eq!(workspace.read(&file).unwrap(), b"data");
    }

    #[test]
    fn test_release_removes_directory() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::create(root.path()).unwrap();
        let file = workspace.write_slot(0, "jpg", b"x").unwrap();
        let path = workspace.path().to_path_buf();

        workspace.release();
        workspace.release();
        assert!(!path.exists());
        assert!(matches!(workspace.read(&file), Err(RenderError::Closed)));
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = TempDir::new().unwrap();
        let path = {
            let workspace = TempWorkspace::create(root.path()).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_sweep_only_touches_prefixed_dirs() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("amnesia-comics-old")).unwrap();
        fs::write(root.path().join("amnesia-comics-old").join("00000.png"), b"x").unwrap();
        fs::create_dir(root.path().join("unrelated")).unwrap();
        fs::write(root.path().join("amnesia-comics-file"), b"x").unwrap();

        assert_eq!(sweep_stale_workspaces(root.path(), Duration::ZERO), 1);
        assert!(!root.path().join("amnesia-comics-old").exists());
        assert!(root.path().join("unrelated").exists());
        assert!(root.path().join("amnesia-comics-file").exists());
    }

    #[test]
    fn test_sweep_keeps_fresh_dirs() {
        let root = TempDir::new().unwrap();
        let workspace = TempWorkspace::create(root.path()).unwrap();

        assert_eq!(sweep_stale_workspaces(root.path(), STALE_AFTER), 0);
        assert!(workspace.path().exists());
    }

    #[test]
    fn test_sweep_missing_root() {
        assert_eq!(sweep_stale_workspaces(Path::new("/no/such/root"), Duration::ZERO), 0);
    }
}
