//! Filesystem enumeration of the content root.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use athenaeum_core::{Error, Result, epoch_seconds};
use walkdir::WalkDir;

/// Names starting with this marker are never treated as sites.
const HIDDEN_PREFIX: char = '.';

pub fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_PREFIX)
}

/// Names of the valid site directories directly under `content_dir`.
///
/// Hidden entries and anything that is not a directory are excluded.
/// Failing to read `content_dir` itself is an error; a single unreadable
/// entry is skipped.
pub fn list_valid_sites(content_dir: &Path) -> Result<BTreeSet<String>> {
    let mut sites = BTreeSet::new();

    for entry in fs::read_dir(content_dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable content entry");
                continue;
            }
        };

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(entry = ?entry.file_name(), "Skipping site with non UTF-8 name");
            continue;
        };

        if is_hidden(&name) {
            continue;
        }

        // Follows symlinks, so a linked site directory counts.
        if entry.path().is_dir() {
            sites.insert(name);
        }
    }

    Ok(sites)
}

/// Newest modification time of any regular file under `site_dir`, in
/// epoch seconds. Empty trees yield 0.
pub fn try_site_mtime(site_dir: &Path) -> Result<f64> {
    let mut newest: f64 = 0.0;

    for entry in WalkDir::new(site_dir) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|e| Error::Io(e.into()))?
            .modified()?;
        newest = newest.max(epoch_seconds(modified));
    }

    Ok(newest)
}

/// Like [`try_site_mtime`], but an unreadable tree counts as 0.
pub fn site_mtime(name: &str, site_dir: &Path) -> f64 {
    match try_site_mtime(site_dir) {
        Ok(mtime) => mtime,
        Err(e) => {
            tracing::warn!(site = %name, error = %e, "Failed to compute site mtime");
            0.0
        }
    }
}
