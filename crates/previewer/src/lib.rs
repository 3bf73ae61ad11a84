//! Site previews rendered with headless Chrome/Chromium.

mod chrome;
pub mod error;

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use athenaeum_core::ENTRY_PAGE;
use athenaeum_core::config::PreviewConfig;
use athenaeum_registry::{PreviewJob, PreviewRenderer, PreviewReport};

pub use crate::chrome::{Capture, Chrome, screenshot_args};
use crate::error::Result;

/// [`PreviewRenderer`] that screenshots each site's entry page.
///
/// Sites are rendered one after another. A failing site is logged and
/// counted; its previous preview, if any, is kept.
pub struct ChromePreviewer {
    chrome: Chrome,
    capture: Capture,
}

impl ChromePreviewer {
    /// Locate a browser according to `config`.
    pub fn discover(config: &PreviewConfig) -> Result<Self> {
        let chrome = Chrome::discover(config.chrome.as_deref())?;
        Ok(Self::new(chrome, config))
    }

    pub fn new(chrome: Chrome, config: &PreviewConfig) -> Self {
        Self {
            chrome,
            capture: Capture {
                width: config.width,
                height: config.height,
                settle: config.settle,
                timeout: config.page_timeout,
            },
        }
    }

    pub fn chrome(&self) -> &Chrome {
        &self.chrome
    }

    async fn render_one(&self, job: &PreviewJob, page: &Path) -> Result<()> {
        if let Some(parent) = job.target.parent() {
            fs::create_dir_all(parent)?;
        }
        let page = fs::canonicalize(page).unwrap_or_else(|_| page.to_path_buf());

        // Render next to the target and rename, so a failed run leaves the
        // old preview alone.
        let staging = StagingFile::new(staging_path(&job.target));
        self.chrome.screenshot(&page, &staging.0, self.capture).await?;
        fs::rename(&staging.0, &job.target)?;
        Ok(())
    }
}

/// Screenshot being written; removed on drop unless renamed into place,
/// including when the render is abandoned mid-flight.
struct StagingFile(PathBuf);

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        let _ = fs::remove_file(&path);
        Self(path)
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".rendering");
    if let Some(ext) = target.extension() {
        name.push(".");
        name.push(ext);
    }
    target.with_file_name(name)
}

#[async_trait]
impl PreviewRenderer for ChromePreviewer {
    async fn render(&self, jobs: &[PreviewJob]) -> PreviewReport {
        let mut report = PreviewReport::default();

        for job in jobs {
            let page = job.site_path.join(ENTRY_PAGE);
            if !page.is_file() {
                tracing::info!(site = %job.name, "Entry page not found, skipping preview");
                report.skipped += 1;
                continue;
            }

            tracing::info!(site = %job.name, "Generating preview");
            match self.render_one(job, &page).await {
                Ok(()) => {
                    tracing::info!(site = %job.name, target = %job.target.display(), "Preview generated");
                    report.rendered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        site = %job.name,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Failed to generate preview"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}
