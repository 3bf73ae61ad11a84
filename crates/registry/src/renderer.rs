use std::path::PathBuf;

use async_trait::async_trait;

/// A site that needs a fresh preview image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewJob {
    pub name: String,
    /// Root directory of the site
    pub site_path: PathBuf,
    /// Image file to write, overwriting any existing one
    pub target: PathBuf,
}

/// Per-batch counts, for logging only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreviewReport {
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Renders site previews.
///
/// Implementations skip sites without an entry page, isolate per-site
/// failures and never fail the batch as a whole. Callers bound the total
/// time by dropping the future; implementations must not leave work
/// running after that.
#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    async fn render(&self, jobs: &[PreviewJob]) -> PreviewReport;
}

/// Renderer used when no browser is available. Skips every job.
pub struct DisabledRenderer;

#[async_trait]
impl PreviewRenderer for DisabledRenderer {
    async fn render(&self, jobs: &[PreviewJob]) -> PreviewReport {
        for job in jobs {
            tracing::warn!(site = %job.name, "Preview rendering disabled, skipping");
        }
        PreviewReport {
            skipped: jobs.len(),
            ..PreviewReport::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_renderer_skips_everything() {
        let jobs = vec![PreviewJob {
            name: "a".to_string(),
            site_path: PathBuf::from("/c/a"),
            target: PathBuf::from("/p/a.png"),
        }];
        let report = DisabledRenderer.render(&jobs).await;
        assert_eq!(
            report,
            PreviewReport {
                rendered: 0,
                skipped: 1,
                failed: 0
            }
        );
        assert!(!jobs[0].target.exists());
    }
}
