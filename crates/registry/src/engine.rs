//! Reconciliation of the known site list against the content root.
//!
//! [`Reconciler::prepare`] is the synchronous half of a reconciliation: it
//! enumerates the content root, removes previews of vanished sites and
//! decides which sites need a new preview. Rendering and publishing are
//! driven by [`crate::SiteRegistry`].

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

use athenaeum_core::{Config, Result, SiteRecord, preview_file_for};

use crate::renderer::PreviewJob;
use crate::scan::{list_valid_sites, site_mtime};

/// Computes new site lists for one installation.
#[derive(Debug, Clone)]
pub struct Reconciler {
    content_dir: PathBuf,
    previews_dir: PathBuf,
    image_ext: String,
}

/// Result of [`Reconciler::prepare`], waiting for previews to be rendered.
#[derive(Debug)]
pub struct PendingReconciliation {
    /// Every current site in name order
    pub sites: Vec<SiteRecord>,
    /// Sites that are new or modified
    pub jobs: Vec<PreviewJob>,
    /// Names that disappeared since the last reconciliation
    pub removed: Vec<String>,
    current: BTreeSet<String>,
}

impl PendingReconciliation {
    /// New or modified sites plus removed ones.
    pub fn changes_count(&self) -> usize {
        self.jobs.len() + self.removed.len()
    }

    /// The site list to publish, restricted to names that were valid when
    /// the pass started.
    pub fn into_sites(self) -> Vec<SiteRecord> {
        let current = self.current;
        self.sites
            .into_iter()
            .filter(|site| current.contains(&site.name))
            .collect()
    }
}

impl Reconciler {
    pub fn new(config: &Config) -> Self {
        Self {
            content_dir: config.paths.content_dir.clone(),
            previews_dir: config.paths.previews_dir.clone(),
            image_ext: config.preview.image_ext.clone(),
        }
    }

    pub fn content_dir(&self) -> &std::path::Path {
        &self.content_dir
    }

    pub fn previews_dir(&self) -> &std::path::Path {
        &self.previews_dir
    }

    /// Diff `known` against the content root.
    ///
    /// Known sites whose newest file is not newer than their recorded
    /// `last_modified` are carried over unchanged and get no job.
    pub fn prepare(&self, known: &[SiteRecord]) -> Result<PendingReconciliation> {
        let current = list_valid_sites(&self.content_dir)?;
        let known: HashMap<&str, &SiteRecord> =
            known.iter().map(|site| (site.name.as_str(), site)).collect();

        let mut removed: Vec<String> = known
            .keys()
            .filter(|name| !current.contains(**name))
            .map(|name| name.to_string())
            .collect();
        removed.sort();
        for name in &removed {
            self.remove_preview(name);
        }

        let mut sites = Vec::with_capacity(current.len());
        let mut jobs = Vec::new();

        for name in &current {
            let site_path = self.content_dir.join(name);
            let mtime = site_mtime(name, &site_path);

            match known.get(name.as_str()) {
                Some(existing) if mtime <= existing.last_modified => {
                    sites.push((*existing).clone());
                    continue;
                }
                Some(existing) => {
                    tracing::info!(
                        site = %name,
                        previous = existing.last_modified,
                        current = mtime,
                        "Site modified, regenerating preview"
                    );
                }
                None => {
                    tracing::info!(site = %name, "New site discovered");
                }
            }

            let record = SiteRecord::new(name.as_str(), site_path.clone(), &self.image_ext, mtime);
            jobs.push(PreviewJob {
                name: name.clone(),
                site_path,
                target: record.preview_file(&self.previews_dir, &self.image_ext),
            });
            sites.push(record);
        }

        Ok(PendingReconciliation {
            sites,
            jobs,
            removed,
            current,
        })
    }

    /// Delete the preview image of a site that no longer exists.
    fn remove_preview(&self, name: &str) {
        let preview = preview_file_for(&self.previews_dir, name, &self.image_ext);
        if !preview.exists() {
            return;
        }
        match fs::remove_file(&preview) {
            Ok(()) => tracing::info!(site = %name, "Removed preview for deleted site"),
            Err(e) => tracing::warn!(site = %name, error = %e, "Failed to remove preview"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::Path;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Reconciler) {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        fs::create_dir_all(&config.paths.content_dir).unwrap();
        fs::create_dir_all(&config.paths.previews_dir).unwrap();
        let reconciler = Reconciler::new(&config);
        (dir, reconciler)
    }

    fn write_at(path: &Path, secs: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"<h1>hi</h1>").unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_new_sites_get_jobs_with_current_mtime() {
        let (_dir, reconciler) = setup();
        write_at(&reconciler.content_dir().join("b/index.html"), 300);
        fs::create_dir(reconciler.content_dir().join("a")).unwrap();

        let pending = reconciler.prepare(&[]).unwrap();

        let names: Vec<_> = pending.sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(pending.jobs.len(), 2);
        assert_eq!(pending.changes_count(), 2);
        assert_eq!(pending.sites[0].last_modified, 0.0);
        assert_eq!(pending.sites[1].last_modified, 300.0);
        assert_eq!(
            pending.jobs[1].target,
            reconciler.previews_dir().join("b.png")
        );
    }

    #[test]
    fn test_unmodified_known_site_is_carried_over() {
        let (_dir, reconciler) = setup();
        let site_dir = reconciler.content_dir().join("a");
        write_at(&site_dir.join("index.html"), 100);

        let mut known = SiteRecord::new("a", &site_dir, "png", 100.0);
        known.preview_ref = "/legacy/a.png".to_string();

        let pending = reconciler.prepare(std::slice::from_ref(&known)).unwrap();
        assert!(pending.jobs.is_empty());
        assert_eq!(pending.changes_count(), 0);
        assert_eq!(pending.into_sites(), vec![known]);
    }

    #[test]
    fn test_modified_known_site_gets_job() {
        let (_dir, reconciler) = setup();
        let site_dir = reconciler.content_dir().join("a");
        write_at(&site_dir.join("index.html"), 150);

        let known = SiteRecord::new("a", &site_dir, "png", 100.0);
        let pending = reconciler.prepare(&[known]).unwrap();

        assert_eq!(pending.jobs.len(), 1);
        assert_eq!(pending.sites[0].last_modified, 150.0);
    }

    #[test]
    fn test_removed_site_preview_deleted() {
        let (_dir, reconciler) = setup();
        let preview = reconciler.previews_dir().join("gone.png");
        fs::write(&preview, b"png").unwrap();

        let known = SiteRecord::new("gone", reconciler.content_dir().join("gone"), "png", 10.0);
        let pending = reconciler.prepare(&[known]).unwrap();

        assert_eq!(pending.removed, vec!["gone".to_string()]);
        assert_eq!(pending.changes_count(), 1);
        assert!(!preview.exists());
        assert!(pending.into_sites().is_empty());
    }

    #[test]
    fn test_missing_content_root_is_error() {
        let (_dir, reconciler) = setup();
        fs::remove_dir_all(reconciler.content_dir()).unwrap();
        assert!(reconciler.prepare(&[]).is_err());
    }
}
