pub mod list;
pub mod scan;
pub mod serve;
mod template;

use anyhow::{Context, Result};
use athenaeum_core::{Config, load_config};
use athenaeum_previewer::ChromePreviewer;
use athenaeum_registry::{DisabledRenderer, PreviewRenderer};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Resolve `root` and load its `athenaeum.toml` (defaults if absent).
pub(crate) fn load_installation(root: &Path) -> Result<Config> {
    let root = fs::canonicalize(root)
        .with_context(|| format!("Installation root not found: {}", root.display()))?;
    load_config(&root).with_context(|| format!("Failed to load config from {}", root.display()))
}

/// Chrome previewer if a browser can be found, otherwise a renderer that
/// skips every job.
pub(crate) fn renderer_for(config: &Config) -> Arc<dyn PreviewRenderer> {
    match ChromePreviewer::discover(&config.preview) {
        Ok(previewer) => {
            tracing::info!(chrome = ?previewer.chrome(), "Preview renderer ready");
            Arc::new(previewer)
        }
        Err(e) => {
            tracing::error!(error = %e, "No browser available; previews are disabled");
            Arc::new(DisabledRenderer)
        }
    }
}
