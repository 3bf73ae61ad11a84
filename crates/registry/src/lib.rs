//! Site registry and reconciliation engine.
//!
//! Keeps the list of hosted sites in line with the directories under the
//! content root, asks a [`PreviewRenderer`] for previews of new and changed
//! sites, and persists the result through a [`StateStore`].

pub mod detector;
pub mod engine;
pub mod registry;
pub mod renderer;
pub mod scan;
pub mod store;

pub use detector::{ChangeDetector, SiteChanges};
pub use engine::{PendingReconciliation, Reconciler};
pub use registry::{RefreshOutcome, SiteRegistry};
pub use renderer::{DisabledRenderer, PreviewJob, PreviewReport, PreviewRenderer};
pub use store::StateStore;
