//! Background polling for added and removed sites.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use athenaeum_core::Result;
use tokio::sync::watch;

use crate::registry::SiteRegistry;
use crate::scan::list_valid_sites;

/// Difference between the registry and the content root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SiteChanges {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl SiteChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compares the valid site directories with a set of known names.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    content_dir: PathBuf,
}

impl ChangeDetector {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    /// Symmetric difference between the content root and `known`.
    pub fn detect(&self, known: &BTreeSet<String>) -> Result<SiteChanges> {
        let current = list_valid_sites(&self.content_dir)?;
        Ok(SiteChanges {
            added: current.difference(known).cloned().collect(),
            removed: known.difference(&current).cloned().collect(),
        })
    }
}

/// Poll loop run by [`SiteRegistry::start`].
///
/// Each detected change spawns a reconciliation without waiting for it.
/// Errors are logged and followed by the longer backoff sleep. The loop
/// exits once `shutdown` turns `true`.
pub(crate) async fn run(registry: Arc<SiteRegistry>, mut shutdown: watch::Receiver<bool>) {
    let monitor = registry.monitor_config().clone();
    tracing::info!(
        interval_secs = monitor.poll_interval.as_secs_f64(),
        "Change detector started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = match registry.detect_changes().await {
            Ok(changes) if changes.is_empty() => monitor.poll_interval,
            Ok(changes) => {
                tracing::info!(
                    new = changes.added.len(),
                    removed = changes.removed.len(),
                    "Changes detected"
                );
                let worker = Arc::clone(&registry);
                tokio::spawn(async move {
                    if let Err(e) = worker.reconcile(false).await {
                        tracing::warn!(error = %e, "Background reconciliation failed");
                    }
                });
                monitor.poll_interval
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backoff_secs = monitor.error_backoff.as_secs_f64(),
                    "Change detection failed"
                );
                monitor.error_backoff
            }
        };

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("Change detector stopped");
}
