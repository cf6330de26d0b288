//! The flow tracer: a constrained, definition-level traversal.
//!
//! Starting from user-facing entry members, walks the call graph,
//! recording the interaction whenever a step crosses a module boundary
//! and bridging at leaves across inferred or contract-matched
//! interactions. Traversal stops at entry-point modules that are
//! themselves bridge targets. The tracer never mutates the store; it
//! emits [`FlowSuggestion`]s for the enrichment pipeline to persist.
//!
//! Cycles, missing interactions, and missing definitions are recovered
//! locally by skipping the offending step.

use crate::flow::TraceContext;
use crate::utils::{capitalize, to_kebab_case};
use crate::{ActionType, DefinitionId, InteractionId, InteractionSource, ModuleId};
use std::collections::HashSet;
use tracing::{debug, trace};

/// One entry member of an entry-point module, with its inferred action.
#[derive(Debug, Clone)]
pub struct EntryMember {
    pub definition_id: DefinitionId,
    pub action_type: Option<ActionType>,
    pub target_entity: Option<String>,
    /// Declared name of the callee to trace from, honored for mutation
    /// actions only.
    pub trace_from: Option<String>,
    pub stakeholder: Option<String>,
}

/// An entry-point module with its entry members.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub module_id: ModuleId,
    pub members: Vec<EntryMember>,
}

/// A bridge crossed during the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferredStep {
    pub from_module: ModuleId,
    pub to_module: ModuleId,
    pub from_definition: DefinitionId,
    pub to_definition: Option<DefinitionId>,
    /// The actual source of the bridged interaction.
    pub source: InteractionSource,
}

/// What the tracer proposes for one (entry member, action) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSuggestion {
    pub slug: String,
    pub display_name: String,
    pub entry_definition_id: DefinitionId,
    pub entry_module_id: ModuleId,
    pub action_type: Option<ActionType>,
    pub target_entity: Option<String>,
    pub stakeholder: Option<String>,
    pub tier: u32,
    /// Interactions crossed, in traversal order, deduplicated.
    pub interaction_ids: Vec<InteractionId>,
    /// Concrete definition steps, in traversal order.
    pub definition_steps: Vec<(DefinitionId, DefinitionId)>,
    pub inferred_steps: Vec<InferredStep>,
    /// Slugs of atomic flows whose interaction appears in the trace.
    pub subflow_slugs: Vec<String>,
}

/// Trace one composite flow per entry member of every entry point.
pub fn trace_flows_from_entry_points(
    ctx: &TraceContext,
    entry_points: &[EntryPoint],
) -> Vec<FlowSuggestion> {
    let mut suggestions = Vec::new();
    for entry_point in entry_points {
        for member in &entry_point.members {
            if let Some(suggestion) = trace_one(ctx, entry_point.module_id, member) {
                suggestions.push(suggestion);
            }
        }
    }
    suggestions
}

fn trace_one(
    ctx: &TraceContext,
    entry_module: ModuleId,
    member: &EntryMember,
) -> Option<FlowSuggestion> {
    let member_name = ctx.def_names.get(&member.definition_id)?;
    let start = starting_definition(ctx, member);
    debug!(
        "tracing from '{}' (start {})",
        member_name, start
    );

    let mut walk = Walk {
        ctx,
        visited: HashSet::new(),
        interaction_ids: Vec::new(),
        seen_interactions: HashSet::new(),
        definition_steps: Vec::new(),
        inferred_steps: Vec::new(),
        fired_module_bridges: HashSet::new(),
    };
    walk.dfs(start);

    let display_name = flow_display_name(member, member_name);
    let subflow_slugs = walk
        .interaction_ids
        .iter()
        .filter_map(|id| ctx.atomic_flows.get(id).cloned())
        .collect();

    Some(FlowSuggestion {
        slug: to_kebab_case(&display_name),
        display_name,
        entry_definition_id: member.definition_id,
        entry_module_id: entry_module,
        action_type: member.action_type,
        target_entity: member.target_entity.clone(),
        stakeholder: member.stakeholder.clone(),
        tier: 1,
        interaction_ids: walk.interaction_ids,
        definition_steps: walk.definition_steps,
        inferred_steps: walk.inferred_steps,
        subflow_slugs,
    })
}

/// Mutation actions resolve the declared trace-from name to a direct
/// callee; view actions ignore the hint, since the whole component tree
/// matters.
fn starting_definition(ctx: &TraceContext, member: &EntryMember) -> DefinitionId {
    let is_mutation = member.action_type.is_some_and(|a| a.is_mutation());
    if !is_mutation {
        return member.definition_id;
    }
    let Some(trace_from) = member.trace_from.as_deref() else {
        return member.definition_id;
    };
    ctx.adjacency
        .get(&member.definition_id)
        .into_iter()
        .flatten()
        .find(|succ| ctx.def_names.get(succ).is_some_and(|n| n == trace_from))
        .copied()
        .unwrap_or(member.definition_id)
}

struct Walk<'a> {
    ctx: &'a TraceContext,
    visited: HashSet<DefinitionId>,
    interaction_ids: Vec<InteractionId>,
    seen_interactions: HashSet<InteractionId>,
    definition_steps: Vec<(DefinitionId, DefinitionId)>,
    inferred_steps: Vec<InferredStep>,
    /// Module-pair bridges already fired without a definition link.
    fired_module_bridges: HashSet<(ModuleId, ModuleId)>,
}

impl Walk<'_> {
    fn dfs(&mut self, def: DefinitionId) {
        if !self.visited.insert(def) {
            return;
        }
        let Some(module) = self.ctx.module_of(def) else {
            trace!("definition {def} has no module; stopping here");
            return;
        };

        let successors = self.ctx.adjacency.get(&def);
        let Some(successors) = successors.filter(|s| !s.is_empty()) else {
            // A leaf: the only place bridges fire.
            self.bridge_from(def, module);
            return;
        };

        for &succ in successors {
            if self.visited.contains(&succ) {
                continue; // cycle short-circuit
            }
            let Some(succ_module) = self.ctx.module_of(succ) else {
                trace!("successor {succ} has no module; skipping step");
                continue;
            };

            if succ_module != module {
                // Module-boundary step: record the interaction if one
                // exists (never synthesize) plus the concrete step.
                if let Some(&interaction) =
                    self.ctx.interaction_by_pair.get(&(module, succ_module))
                {
                    self.record_interaction(interaction);
                }
                self.definition_steps.push((def, succ));

                // The boundary check applies before descent: an entry
                // module that is also a bridge target ends the walk.
                if self.ctx.is_boundary_module(succ_module) {
                    trace!("stopping at boundary module {succ_module}");
                    continue;
                }
            }
            self.dfs(succ);
        }
    }

    /// At a leaf, cross every bridgeable interaction leaving the module.
    /// A definition-level link from this exact definition pins the target;
    /// otherwise the module-level bridge fires once per module pair with a
    /// representative target definition.
    fn bridge_from(&mut self, def: DefinitionId, module: ModuleId) {
        let Some(bridges) = self.ctx.bridgeable_by_source.get(&module) else {
            return;
        };
        for bridge in bridges {
            let linked = self
                .ctx
                .bridge_links
                .get(&def)
                .and_then(|targets| targets.get(&bridge.to_module))
                .copied();

            let to_definition = match linked {
                Some(target) => Some(target),
                None => {
                    // Without links, dedup on the module pair.
                    if !self
                        .fired_module_bridges
                        .insert((module, bridge.to_module))
                    {
                        continue;
                    }
                    self.ctx
                        .module_members
                        .get(&bridge.to_module)
                        .and_then(|members| members.first())
                        .copied()
                }
            };

            self.record_interaction(bridge.interaction_id);
            if let Some(target) = to_definition {
                self.definition_steps.push((def, target));
            }
            self.inferred_steps.push(InferredStep {
                from_module: module,
                to_module: bridge.to_module,
                from_definition: def,
                to_definition,
                source: bridge.source,
            });
            // Bridges terminate: no traversal past the target.
        }
    }

    fn record_interaction(&mut self, interaction: InteractionId) {
        if self.seen_interactions.insert(interaction) {
            self.interaction_ids.push(interaction);
        }
    }
}

/// `action_type + target_entity` when both are present (CreateCustomerFlow),
/// otherwise the entry member's name with a `Flow` suffix.
fn flow_display_name(member: &EntryMember, member_name: &str) -> String {
    match (member.action_type, member.target_entity.as_deref()) {
        (Some(action), Some(entity)) => {
            let entity_part: String = entity.split_whitespace().map(capitalize).collect();
            format!("{}{}Flow", capitalize(action.as_str()), entity_part)
        }
        _ => format!("{}Flow", capitalize(member_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_from_action_and_entity() {
        let member = EntryMember {
            definition_id: DefinitionId::new(1).unwrap(),
            action_type: Some(ActionType::Create),
            target_entity: Some("customer".to_string()),
            trace_from: None,
            stakeholder: None,
        };
        assert_eq!(flow_display_name(&member, "submitForm"), "CreateCustomerFlow");
    }

    #[test]
    fn test_display_name_falls_back_to_member() {
        let member = EntryMember {
            definition_id: DefinitionId::new(1).unwrap(),
            action_type: None,
            target_entity: None,
            trace_from: None,
            stakeholder: None,
        };
        assert_eq!(flow_display_name(&member, "renderDashboard"), "RenderDashboardFlow");
    }
}
