//! Near-duplicate flow pruning.
//!
//! Two traced flows are compared when both have non-empty interaction
//! sets. Overlap ratio is `|A ∩ B| / min(|A|, |B|)`. At or above the
//! threshold, one is dropped only when action type and target entity
//! agree on both sides (both equal or both null); otherwise the flows are
//! semantically distinct and both survive.

use crate::flow::FlowSuggestion;
use std::collections::HashSet;
use tracing::debug;

/// Default overlap ratio at which two flows are dedup candidates.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.7;

/// Prune near-duplicates, preserving input order of survivors.
pub fn dedup_flows(flows: Vec<FlowSuggestion>, threshold: f64) -> Vec<FlowSuggestion> {
    let sets: Vec<HashSet<crate::InteractionId>> = flows
        .iter()
        .map(|f| f.interaction_ids.iter().copied().collect())
        .collect();

    let mut dropped = vec![false; flows.len()];
    for i in 0..flows.len() {
        if dropped[i] || sets[i].is_empty() {
            continue;
        }
        for j in (i + 1)..flows.len() {
            if dropped[j] || sets[j].is_empty() {
                continue;
            }
            let intersection = sets[i].intersection(&sets[j]).count();
            let ratio = intersection as f64 / sets[i].len().min(sets[j].len()) as f64;
            if ratio < threshold {
                continue;
            }
            if !same_semantics(&flows[i], &flows[j]) {
                continue;
            }
            // Drop one of the pair.
            if keep_first(&flows[i], &flows[j]) {
                debug!("dedup drops '{}' in favor of '{}'", flows[j].slug, flows[i].slug);
                dropped[j] = true;
            } else {
                debug!("dedup drops '{}' in favor of '{}'", flows[i].slug, flows[j].slug);
                dropped[i] = true;
                break;
            }
        }
    }

    flows
        .into_iter()
        .zip(dropped)
        .filter_map(|(flow, gone)| (!gone).then_some(flow))
        .collect()
}

/// Action type and target entity must both agree (equal values, or null on
/// both sides) for a drop to be allowed.
fn same_semantics(a: &FlowSuggestion, b: &FlowSuggestion) -> bool {
    a.action_type == b.action_type && a.target_entity == b.target_entity
}

/// Drop rule: keep higher tier; then more definition steps; then fewer
/// interactions (the more focused flow); then the more specific flow
/// (non-null action/target beats catch-all). Returns true when `a` wins.
fn keep_first(a: &FlowSuggestion, b: &FlowSuggestion) -> bool {
    if a.tier != b.tier {
        return a.tier > b.tier;
    }
    if a.definition_steps.len() != b.definition_steps.len() {
        return a.definition_steps.len() > b.definition_steps.len();
    }
    if a.interaction_ids.len() != b.interaction_ids.len() {
        return a.interaction_ids.len() < b.interaction_ids.len();
    }
    specificity(a) >= specificity(b)
}

fn specificity(flow: &FlowSuggestion) -> u8 {
    u8::from(flow.action_type.is_some()) + u8::from(flow.target_entity.is_some())
}
