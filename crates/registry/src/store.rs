//! Persistent state for the site registry.
//!
//! The snapshot is stored as pretty-printed JSON:
//!
//! ```json
//! {
//!     "sites": [
//!         {"name": "blog", "path": "/srv/content/blog", "preview": "/static/previews/blog.png", "last_modified": 1700000000.0}
//!     ],
//!     "last_update": 1700000100.0
//! }
//! ```
//!
//! Unknown fields are ignored on load so older and newer files stay readable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use athenaeum_core::{RegistrySnapshot, Result};
use tempfile::NamedTempFile;

/// Loads and saves [`RegistrySnapshot`]s at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot from disk.
    ///
    /// A missing, unreadable or malformed file yields an empty snapshot.
    pub fn load(&self) -> RegistrySnapshot {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "No state file, starting empty");
            return RegistrySnapshot::default();
        }

        match self.read() {
            Ok(snapshot) => {
                tracing::info!(
                    path = %self.path.display(),
                    site_count = snapshot.sites.len(),
                    "Loaded sites from state file"
                );
                snapshot
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to load state, starting empty");
                RegistrySnapshot::default()
            }
        }
    }

    /// Write the snapshot, logging instead of failing.
    ///
    /// Returns `true` when the file was written.
    pub fn save(&self, snapshot: &RegistrySnapshot) -> bool {
        match self.write(snapshot) {
            Ok(()) => {
                tracing::debug!(site_count = snapshot.sites.len(), "Saved state");
                true
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to save state");
                false
            }
        }
    }

    fn read(&self) -> Result<RegistrySnapshot> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a temporary file next to the target and rename it into
    /// place, so a crash never leaves a truncated state file behind.
    pub fn write(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let content = serde_json::to_string_pretty(snapshot)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
