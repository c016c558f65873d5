use std::fs;
use std::path::{Path, PathBuf};

use qmb_core::errors::BatchError;
use serde::{Deserialize, Serialize};

/// Scratch directory holding rendered submission scripts.
pub const SCRATCH_DIR: &str = "tmp";
/// Scheduler and local logs of compute stages.
pub const LOG_DIR: &str = "log";
/// Output tree of the external executable.
pub const RESULTS_DIR: &str = "results";
/// Logs of dependent (post-processing) stages.
pub const DEPENDENCY_LOG_DIR: &str = "log_deps";

/// Working directory layout under a storage root.
///
/// Construction is pure; call [`FolderLayout::prepare`] to create the
/// directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderLayout {
    pub root: PathBuf,
    pub scratch: PathBuf,
    pub logs: PathBuf,
    pub results: PathBuf,
    pub dependency_logs: PathBuf,
}

impl FolderLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            scratch: root.join(SCRATCH_DIR),
            logs: root.join(LOG_DIR),
            results: root.join(RESULTS_DIR),
            dependency_logs: root.join(DEPENDENCY_LOG_DIR),
            root,
        }
    }

    pub fn subdirs(&self) -> [&Path; 4] {
        [
            self.scratch.as_path(),
            self.logs.as_path(),
            self.results.as_path(),
            self.dependency_logs.as_path(),
        ]
    }

    /// Creates the root and the four subdirectories. Existing directories
    /// and their contents are left untouched.
    pub fn prepare(&self) -> Result<&Self, BatchError> {
        fs::create_dir_all(&self.root)
            .map_err(|err| BatchError::layout("storage_root", self.root.display(), err))?;
        for dir in self.subdirs() {
            fs::create_dir_all(dir)
                .map_err(|err| BatchError::layout("storage_subdir", dir.display(), err))?;
        }
        tracing::debug!(root = %self.root.display(), "storage layout ready");
        Ok(self)
    }

    pub fn is_prepared(&self) -> bool {
        self.subdirs().iter().all(|dir| dir.is_dir())
    }
}

/// Builds and prepares the layout for `root` in one step.
pub fn prepare_folders(root: impl Into<PathBuf>) -> Result<FolderLayout, BatchError> {
    let layout = FolderLayout::new(root);
    layout.prepare()?;
    Ok(layout)
}
