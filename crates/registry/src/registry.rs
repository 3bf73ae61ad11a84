//! The shared site registry.
//!
//! [`SiteRegistry`] owns the current [`RegistrySnapshot`] and is the only
//! path for reading or replacing it.
//!
//! # Thread Safety
//!
//! - `state: Mutex<RegistrySnapshot>` guards the site list and timestamp.
//!   It is held only to copy data in or out, never across rendering.
//! - `updating: AtomicBool` is the in-progress flag. It is claimed with a
//!   compare-and-swap, so at most one reconciliation runs at a time, and
//!   released by a drop guard, so cancellation and errors release it too.
//! - `shutdown: watch::Sender<bool>` stops the change detector. Results of a
//!   reconciliation that completes after shutdown are discarded.

use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use athenaeum_core::config::MonitorConfig;
use athenaeum_core::{
    Config, Error, RefreshResponse, RegistrySnapshot, Result, SiteRecord, now_epoch_seconds,
    preview_ref_for,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::detector::{self, ChangeDetector, SiteChanges};
use crate::engine::Reconciler;
use crate::renderer::PreviewRenderer;
use crate::store::StateStore;

/// Outcome of a reconciliation the caller waited for with a timeout.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Number of new, modified and removed sites; 0 when another
    /// reconciliation was already running.
    Completed(usize),
    /// The reconciliation was abandoned and nothing was published.
    TimedOut,
    Failed(Error),
}

impl From<RefreshOutcome> for RefreshResponse {
    fn from(outcome: RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::Completed(changes) => RefreshResponse::success(changes),
            RefreshOutcome::TimedOut => RefreshResponse::timeout(),
            RefreshOutcome::Failed(e) => RefreshResponse::error(e),
        }
    }
}

/// Releases the in-progress flag when dropped.
///
/// Owned, so it can travel into blocking work that outlives an abandoned
/// reconciliation.
struct UpdateGuard(Arc<AtomicBool>);

impl UpdateGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Registry of hosted sites.
pub struct SiteRegistry {
    reconciler: Reconciler,
    detector: ChangeDetector,
    store: StateStore,
    renderer: Arc<dyn PreviewRenderer>,
    monitor: MonitorConfig,
    image_ext: String,
    state: Mutex<RegistrySnapshot>,
    updating: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl SiteRegistry {
    /// Create the registry, loading persisted state or starting empty.
    ///
    /// Creates the previews directory if needed. Does not start the change
    /// detector; see [`SiteRegistry::start`].
    pub fn new(config: &Config, renderer: Arc<dyn PreviewRenderer>) -> Self {
        if let Err(e) = fs::create_dir_all(&config.paths.previews_dir) {
            tracing::warn!(
                path = %config.paths.previews_dir.display(),
                error = %e,
                "Failed to create previews directory"
            );
        }

        let store = StateStore::new(&config.paths.state_file);
        let mut snapshot = store.load();
        // The preview URL is a function of the name; files written with a
        // different layout are normalized on load.
        for site in &mut snapshot.sites {
            site.preview_ref = preview_ref_for(&site.name, &config.preview.image_ext);
        }

        let (shutdown, _) = watch::channel(false);

        Self {
            reconciler: Reconciler::new(config),
            detector: ChangeDetector::new(&config.paths.content_dir),
            store,
            renderer,
            monitor: config.monitor.clone(),
            image_ext: config.preview.image_ext.clone(),
            state: Mutex::new(snapshot),
            updating: Arc::new(AtomicBool::new(false)),
            shutdown,
            monitor_task: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistrySnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current site list.
    pub fn get_sites(&self) -> Vec<SiteRecord> {
        self.lock_state().sites.clone()
    }

    /// Copy of the current site list and last update time.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.lock_state().clone()
    }

    pub fn find(&self, name: &str) -> Option<SiteRecord> {
        self.lock_state().get(name).cloned()
    }

    pub fn site_names(&self) -> BTreeSet<String> {
        self.lock_state().names()
    }

    pub fn last_update(&self) -> f64 {
        self.lock_state().last_update
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    pub fn image_ext(&self) -> &str {
        &self.image_ext
    }

    pub(crate) fn monitor_config(&self) -> &MonitorConfig {
        &self.monitor
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Compare the content root with the registered names.
    pub async fn detect_changes(&self) -> Result<SiteChanges> {
        let known = self.site_names();
        let detector = self.detector.clone();
        blocking(move || detector.detect(&known)).await
    }

    /// Bring the registry in line with the content root.
    ///
    /// Returns the number of new, modified and removed sites. Returns 0
    /// immediately if another reconciliation is in progress. `force` marks
    /// a user-requested refresh; it does not change which sites are
    /// re-rendered.
    pub async fn reconcile(&self, force: bool) -> Result<usize> {
        let Some(guard) = UpdateGuard::acquire(&self.updating) else {
            tracing::info!(force, "Update already in progress, skipping");
            return Ok(0);
        };

        // The guard rides along with the blocking scan. If this future is
        // dropped mid-scan, the flag stays set until the scan has finished.
        let known = self.get_sites();
        let reconciler = self.reconciler.clone();
        let (pending, _guard) = blocking(move || {
            let pending = reconciler.prepare(&known)?;
            Ok((pending, guard))
        })
        .await?;

        if !pending.jobs.is_empty() {
            tracing::info!(
                count = pending.jobs.len(),
                force,
                "Generating previews for new or changed sites"
            );
            let report = self.renderer.render(&pending.jobs).await;
            tracing::info!(
                rendered = report.rendered,
                skipped = report.skipped,
                failed = report.failed,
                "Preview generation finished"
            );
        }

        let changes = pending.changes_count();
        self.publish(pending.into_sites()).await;
        Ok(changes)
    }

    /// Reconcile, waiting at most `timeout`.
    ///
    /// On timeout the reconciliation is dropped: nothing is published and
    /// the in-progress flag is released.
    pub async fn refresh(&self, timeout: Duration) -> RefreshOutcome {
        match tokio::time::timeout(timeout, self.reconcile(true)).await {
            Ok(Ok(changes)) => RefreshOutcome::Completed(changes),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Refresh failed");
                RefreshOutcome::Failed(e)
            }
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs_f64(), "Refresh timed out");
                RefreshOutcome::TimedOut
            }
        }
    }

    async fn publish(&self, sites: Vec<SiteRecord>) {
        let snapshot = {
            let mut state = self.lock_state();
            if self.is_shut_down() {
                tracing::info!("Registry stopped, discarding reconciliation result");
                return;
            }
            state.sites = sites;
            state.last_update = now_epoch_seconds();
            state.clone()
        };
        tracing::info!(site_count = snapshot.sites.len(), "Site list updated");
        self.persist(snapshot).await;
    }

    /// Save a copy of the state off the async workers and outside the lock.
    /// Failures are logged by the store.
    async fn persist(&self, snapshot: RegistrySnapshot) {
        let store = self.store.clone();
        if let Err(e) = blocking(move || Ok(store.save(&snapshot))).await {
            tracing::warn!(error = %e, "Failed to save state");
        }
    }

    /// Start the background change detector. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.monitor_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.is_shut_down() {
            return;
        }
        let receiver = self.shutdown.subscribe();
        *task = Some(tokio::spawn(detector::run(Arc::clone(self), receiver)));
    }

    /// Stop the change detector and persist the final state.
    ///
    /// Waits up to the configured shutdown timeout for the detector to
    /// exit before aborting it.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let task = self
            .monitor_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut handle) = task {
            if tokio::time::timeout(self.monitor.shutdown_timeout, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Change detector did not stop in time, aborting");
                handle.abort();
            }
        }

        self.persist(self.snapshot()).await;
    }
}

/// Run filesystem work off the async worker threads.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Task(e.to_string()))?
}
