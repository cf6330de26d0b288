//! The incremental sync pipeline: change detection, phased application,
//! re-export resolution, and dirty-layer propagation.

mod change;
mod dirty;
mod engine;
mod reexport;
mod walker;

pub use change::{content_hash, ChangeDetector, ChangeSet, FileChange};
pub use dirty::{propagate, DirtySets};
pub use engine::{SyncEngine, SyncResult, SyncWarning};
pub use reexport::ImportResolver;
pub use walker::FileWalker;
