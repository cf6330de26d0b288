//! Post-sync derivations.
//!
//! Non-interactive computations over the store's current state: the
//! definition call graph lives in the store (`call_edges`, rebuilt by
//! [`crate::storage::GraphRepo::rebuild`]); this module derives what sits
//! on top of it — inheritance edges from stored names, module-level
//! interactions, and coverage diagnostics. Everything here is
//! deterministic in the store's state and safe to re-run.

mod coverage;
mod inheritance;
mod interactions;

pub use coverage::{coverage_report, CoverageBucket, CoverageReport};
pub use inheritance::sync_inheritance_edges;
pub use interactions::{derive_ast_interactions, ensure_inheritance_interactions};
