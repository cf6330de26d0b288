//! Flow tracing and deduplication.
//!
//! Flows are ordered traces of interactions from user-facing entry
//! points. The tracer is a pure computation over a [`TraceContext`]
//! snapshot; persistence goes through the enrichment boundary.

mod context;
mod dedup;
mod tracer;

pub use context::{BridgeInteraction, TraceContext};
pub use dedup::{dedup_flows, DEFAULT_OVERLAP_THRESHOLD};
pub use tracer::{
    trace_flows_from_entry_points, EntryMember, EntryPoint, FlowSuggestion, InferredStep,
};
