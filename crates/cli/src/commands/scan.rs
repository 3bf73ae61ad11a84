use anyhow::{Context, Result};
use athenaeum_core::format_timestamp;
use athenaeum_registry::SiteRegistry;
use std::path::PathBuf;

/// Reconcile the registry with the content root once, then exit.
pub async fn run(root: PathBuf) -> Result<()> {
    let config = super::load_installation(&root)?;

    println!("🔍 Scanning {}...", config.paths.content_dir.display());

    let registry = SiteRegistry::new(&config, super::renderer_for(&config));
    let changes = registry
        .reconcile(true)
        .await
        .context("Failed to scan content directory")?;

    let sites = registry.get_sites();
    println!("   ✓ {} change(s), {} site(s)\n", changes, sites.len());
    for site in &sites {
        println!(
            "   {:<32} {}",
            site.name,
            format_timestamp(site.last_modified)
        );
    }

    Ok(())
}
