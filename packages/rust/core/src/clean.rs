//! Output directory cleanup.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, instrument};

use buildgate_shared::{BuildGateError, Result};

/// Removes stale build output, never reaching outside its root.
#[derive(Debug, Clone)]
pub struct OutputCleaner {
    root: PathBuf,
}

impl OutputCleaner {
    /// Create a cleaner confined to `root` (normally the assets root).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Recursively remove `path`. A missing path is not an error.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn clear(&self, path: &Path) -> Result<()> {
        self.ensure_contained(path)?;

        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("nothing to clean");
                return Ok(());
            }
            Err(e) => return Err(BuildGateError::io(path, e)),
        };

        // A symlinked output dir is unlinked, not followed.
        let removed = if meta.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };

        match removed {
            Ok(()) => {
                info!("output cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BuildGateError::io(path, e)),
        }
    }

    fn ensure_contained(&self, path: &Path) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(BuildGateError::validation("refusing to clean with an empty output root"));
        }
        let root = normalize(
            &std::path::absolute(&self.root).map_err(|e| BuildGateError::io(&self.root, e))?,
        );
        let target =
            normalize(&std::path::absolute(path).map_err(|e| BuildGateError::io(path, e))?);

        if root.parent().is_none() {
            return Err(BuildGateError::validation(format!(
                "refusing to clean with output root {}",
                self.root.display()
            )));
        }
        if !target.starts_with(&root) {
            return Err(BuildGateError::validation(format!(
                "refusing to clean {}: outside output root {}",
                path.display(),
                self.root.display()
            )));
        }
        Ok(())
    }
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // A leading `..` is kept; it cannot be resolved lexically.
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
