use anyhow::{Context, Result};
use athenaeum_core::{RegistrySnapshot, format_timestamp};
use athenaeum_registry::StateStore;
use std::path::PathBuf;

/// Print the persisted registry without touching the content root.
pub async fn run(root: PathBuf, json: bool) -> Result<()> {
    let config = super::load_installation(&root)?;
    let snapshot = StateStore::new(&config.paths.state_file).load();

    if json {
        let out = serde_json::to_string_pretty(&snapshot).context("Failed to encode registry")?;
        println!("{}", out);
    } else {
        print!("{}", render_table(&snapshot));
    }
    Ok(())
}

fn render_table(snapshot: &RegistrySnapshot) -> String {
    let mut out = format!("Last update: {}\n", snapshot.last_update_display());
    if snapshot.sites.is_empty() {
        out.push_str("No sites registered\n");
        return out;
    }

    out.push_str(&format!("\n{:<32} {:<20} {}\n", "NAME", "MODIFIED", "PREVIEW"));
    for site in &snapshot.sites {
        out.push_str(&format!(
            "{:<32} {:<20} {}\n",
            site.name,
            format_timestamp(site.last_modified),
            site.preview_ref
        ));
    }
    out
}
