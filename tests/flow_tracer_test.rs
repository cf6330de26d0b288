//! Flow tracer scenarios: linear traces, entry-point boundaries, bridges
//! with and without definition links, and trace determinism.

use codatlas::flow::{
    dedup_flows, trace_flows_from_entry_points, EntryMember, EntryPoint, TraceContext,
    DEFAULT_OVERLAP_THRESHOLD,
};
use codatlas::{
    ActionType, DefinitionId, InteractionId, InteractionSource, ModuleId,
};
use std::collections::HashMap;

fn d(n: u32) -> DefinitionId {
    DefinitionId::new(n).unwrap()
}
fn m(n: u32) -> ModuleId {
    ModuleId::new(n).unwrap()
}
fn i(n: u32) -> InteractionId {
    InteractionId::new(n).unwrap()
}

fn member(def: DefinitionId, action: Option<ActionType>, entity: Option<&str>) -> EntryMember {
    EntryMember {
        definition_id: def,
        action_type: action,
        target_entity: entity.map(str::to_string),
        trace_from: None,
        stakeholder: None,
    }
}

/// Modules M1..M3 with D10 in M1, D20 in M2, D30 in M3.
fn linear_context() -> TraceContext {
    let mut ctx = TraceContext::default();
    ctx.adjacency.insert(d(10), vec![d(20)]);
    ctx.adjacency.insert(d(20), vec![d(30)]);
    ctx.def_modules.insert(d(10), (m(1), "app.m1".to_string()));
    ctx.def_modules.insert(d(20), (m(2), "app.m2".to_string()));
    ctx.def_modules.insert(d(30), (m(3), "app.m3".to_string()));
    ctx.def_names.insert(d(10), "submitCustomer".to_string());
    ctx.def_names.insert(d(20), "createCustomer".to_string());
    ctx.def_names.insert(d(30), "persistCustomer".to_string());
    ctx.interaction_by_pair.insert((m(1), m(2)), i(100));
    ctx.interaction_by_pair.insert((m(2), m(3)), i(101));
    ctx.entry_modules.insert(m(1));
    ctx
}

#[test]
fn test_simple_linear_flow() {
    let mut ctx = linear_context();
    ctx.atomic_flows.insert(i(100), "f-a".to_string());
    ctx.atomic_flows.insert(i(101), "f-b".to_string());

    let entry_points = vec![EntryPoint {
        module_id: m(1),
        members: vec![member(d(10), Some(ActionType::Create), Some("customer"))],
    }];

    let flows = trace_flows_from_entry_points(&ctx, &entry_points);
    assert_eq!(flows.len(), 1);

    let flow = &flows[0];
    assert_eq!(flow.display_name, "CreateCustomerFlow");
    assert_eq!(flow.slug, "create-customer-flow");
    assert_eq!(flow.tier, 1);
    assert_eq!(flow.interaction_ids, vec![i(100), i(101)]);
    assert_eq!(flow.subflow_slugs, vec!["f-a".to_string(), "f-b".to_string()]);
    assert_eq!(flow.definition_steps, vec![(d(10), d(20)), (d(20), d(30))]);
    assert!(flow.inferred_steps.is_empty());
}

#[test]
fn test_entry_point_boundary_stops_expansion() {
    let mut ctx = linear_context();
    // M2 is an entry module and also reached by an inferred interaction
    // from some other module, which makes it a traversal boundary.
    ctx.entry_modules.insert(m(2));
    ctx.bridge_target_modules.insert(m(2));

    let entry_points = vec![EntryPoint {
        module_id: m(1),
        members: vec![member(d(10), None, None)],
    }];

    let flows = trace_flows_from_entry_points(&ctx, &entry_points);
    let flow = &flows[0];

    // The step into M2 is recorded, but M2's own calls are not expanded.
    assert_eq!(flow.interaction_ids, vec![i(100)]);
    assert_eq!(flow.definition_steps, vec![(d(10), d(20))]);
}

#[test]
fn test_entry_only_module_is_still_expanded() {
    let mut ctx = linear_context();
    // M2 is an entry module but NOT a bridge target: expansion continues.
    ctx.entry_modules.insert(m(2));

    let entry_points = vec![EntryPoint {
        module_id: m(1),
        members: vec![member(d(10), None, None)],
    }];

    let flows = trace_flows_from_entry_points(&ctx, &entry_points);
    assert_eq!(flows[0].interaction_ids, vec![i(100), i(101)]);
}

#[test]
fn test_bridge_at_leaf_with_definition_link() {
    let mut ctx = TraceContext::default();
    ctx.adjacency.insert(d(10), vec![d(20)]);
    // D30 calls further into M3; a bridge must not follow it.
    ctx.adjacency.insert(d(30), vec![d(31)]);
    ctx.def_modules.insert(d(10), (m(1), "app.m1".to_string()));
    ctx.def_modules.insert(d(20), (m(2), "app.m2".to_string()));
    ctx.def_modules.insert(d(30), (m(3), "app.m3".to_string()));
    ctx.def_modules.insert(d(31), (m(3), "app.m3".to_string()));
    ctx.def_names.insert(d(10), "submit".to_string());
    ctx.interaction_by_pair.insert((m(1), m(2)), i(100));
    ctx.interaction_by_pair.insert((m(2), m(3)), i(101));
    ctx.entry_modules.insert(m(1));
    ctx.bridgeable_by_source.insert(
        m(2),
        vec![codatlas::flow::BridgeInteraction {
            interaction_id: i(101),
            to_module: m(3),
            source: InteractionSource::ContractMatched,
        }],
    );
    ctx.bridge_target_modules.insert(m(3));
    ctx.bridge_links
        .entry(d(20))
        .or_default()
        .insert(m(3), d(30));

    let entry_points = vec![EntryPoint {
        module_id: m(1),
        members: vec![member(d(10), None, None)],
    }];

    let flows = trace_flows_from_entry_points(&ctx, &entry_points);
    let flow = &flows[0];

    assert_eq!(flow.interaction_ids, vec![i(100), i(101)]);
    assert_eq!(flow.inferred_steps.len(), 1);
    let step = flow.inferred_steps[0];
    assert_eq!(step.from_module, m(2));
    assert_eq!(step.to_module, m(3));
    assert_eq!(step.from_definition, d(20));
    assert_eq!(step.to_definition, Some(d(30)));
    assert_eq!(step.source, InteractionSource::ContractMatched);

    // The exact linked endpoint is recorded, and M3's call graph is not
    // traversed.
    assert!(flow.definition_steps.contains(&(d(20), d(30))));
    assert!(!flow.definition_steps.contains(&(d(30), d(31))));
}

#[test]
fn test_no_duplicate_module_level_bridges() {
    let mut ctx = TraceContext::default();
    // Two leaves in M2, no definition links, one inferred bridge to M3.
    ctx.adjacency.insert(d(10), vec![d(20), d(21)]);
    ctx.def_modules.insert(d(10), (m(1), "app.m1".to_string()));
    ctx.def_modules.insert(d(20), (m(2), "app.m2".to_string()));
    ctx.def_modules.insert(d(21), (m(2), "app.m2".to_string()));
    ctx.def_modules.insert(d(30), (m(3), "app.m3".to_string()));
    ctx.def_names.insert(d(10), "submit".to_string());
    ctx.interaction_by_pair.insert((m(1), m(2)), i(100));
    ctx.entry_modules.insert(m(1));
    ctx.bridgeable_by_source.insert(
        m(2),
        vec![codatlas::flow::BridgeInteraction {
            interaction_id: i(101),
            to_module: m(3),
            source: InteractionSource::LlmInferred,
        }],
    );
    ctx.bridge_target_modules.insert(m(3));
    ctx.module_members.insert(m(3), vec![d(30)]);

    let entry_points = vec![EntryPoint {
        module_id: m(1),
        members: vec![member(d(10), None, None)],
    }];

    let flows = trace_flows_from_entry_points(&ctx, &entry_points);
    let flow = &flows[0];

    assert_eq!(flow.inferred_steps.len(), 1);
    assert_eq!(flow.inferred_steps[0].source, InteractionSource::LlmInferred);
    assert_eq!(flow.inferred_steps[0].to_definition, Some(d(30)));
    assert_eq!(
        flow.interaction_ids.iter().filter(|id| **id == i(101)).count(),
        1
    );
}

#[test]
fn test_distinct_definition_links_fire_independently() {
    let mut ctx = TraceContext::default();
    ctx.adjacency.insert(d(10), vec![d(20), d(21)]);
    ctx.def_modules.insert(d(10), (m(1), "app.m1".to_string()));
    ctx.def_modules.insert(d(20), (m(2), "app.m2".to_string()));
    ctx.def_modules.insert(d(21), (m(2), "app.m2".to_string()));
    ctx.def_modules.insert(d(30), (m(3), "app.m3".to_string()));
    ctx.def_modules.insert(d(31), (m(3), "app.m3".to_string()));
    ctx.def_names.insert(d(10), "submit".to_string());
    ctx.entry_modules.insert(m(1));
    ctx.bridgeable_by_source.insert(
        m(2),
        vec![codatlas::flow::BridgeInteraction {
            interaction_id: i(101),
            to_module: m(3),
            source: InteractionSource::ContractMatched,
        }],
    );
    ctx.bridge_target_modules.insert(m(3));
    ctx.bridge_links.entry(d(20)).or_default().insert(m(3), d(30));
    ctx.bridge_links.entry(d(21)).or_default().insert(m(3), d(31));

    let entry_points = vec![EntryPoint {
        module_id: m(1),
        members: vec![member(d(10), None, None)],
    }];

    let flows = trace_flows_from_entry_points(&ctx, &entry_points);
    let flow = &flows[0];

    // Each leaf's link fires with its own endpoints.
    assert_eq!(flow.inferred_steps.len(), 2);
    let targets: Vec<Option<DefinitionId>> =
        flow.inferred_steps.iter().map(|s| s.to_definition).collect();
    assert!(targets.contains(&Some(d(30))));
    assert!(targets.contains(&Some(d(31))));
}

#[test]
fn test_mutation_honors_trace_from_hint() {
    let mut ctx = linear_context();
    // D10 calls both a logger and the real mutation path; the hint picks
    // the mutation path.
    ctx.adjacency.insert(d(10), vec![d(15), d(20)]);
    ctx.adjacency.insert(d(15), vec![]);
    ctx.def_modules.insert(d(15), (m(1), "app.m1".to_string()));
    ctx.def_names.insert(d(15), "logClick".to_string());

    let mut with_hint = member(d(10), Some(ActionType::Update), Some("customer"));
    with_hint.trace_from = Some("createCustomer".to_string());

    let flows = trace_flows_from_entry_points(
        &ctx,
        &[EntryPoint {
            module_id: m(1),
            members: vec![with_hint.clone()],
        }],
    );
    // The trace starts at D20, so the M1->M2 step is never taken.
    assert_eq!(flows[0].interaction_ids, vec![i(101)]);
    assert_eq!(flows[0].definition_steps, vec![(d(20), d(30))]);

    // A view action ignores the hint and walks the whole tree.
    let mut view = with_hint;
    view.action_type = Some(ActionType::View);
    let flows = trace_flows_from_entry_points(
        &ctx,
        &[EntryPoint {
            module_id: m(1),
            members: vec![view],
        }],
    );
    assert_eq!(flows[0].interaction_ids, vec![i(100), i(101)]);
}

#[test]
fn test_cycle_short_circuits() {
    let mut ctx = linear_context();
    // D30 calls back into D10.
    ctx.adjacency.insert(d(30), vec![d(10)]);

    let flows = trace_flows_from_entry_points(
        &ctx,
        &[EntryPoint {
            module_id: m(1),
            members: vec![member(d(10), None, None)],
        }],
    );
    // The cycle step is skipped; everything traversed is kept.
    assert_eq!(flows[0].interaction_ids, vec![i(100), i(101)]);
}

#[test]
fn test_missing_interaction_is_not_synthesized() {
    let mut ctx = linear_context();
    ctx.interaction_by_pair.remove(&(m(2), m(3)));

    let flows = trace_flows_from_entry_points(
        &ctx,
        &[EntryPoint {
            module_id: m(1),
            members: vec![member(d(10), None, None)],
        }],
    );
    let flow = &flows[0];
    assert_eq!(flow.interaction_ids, vec![i(100)]);
    // The definition step is still recorded.
    assert!(flow.definition_steps.contains(&(d(20), d(30))));
}

#[test]
fn test_trace_is_deterministic() {
    let ctx = linear_context();
    let entry_points = vec![EntryPoint {
        module_id: m(1),
        members: vec![member(d(10), Some(ActionType::Create), Some("customer"))],
    }];

    let first = trace_flows_from_entry_points(&ctx, &entry_points);
    let second = trace_flows_from_entry_points(&ctx, &entry_points);
    assert_eq!(first, second);
}

#[test]
fn test_traced_flows_dedup_end_to_end() {
    let ctx = linear_context();

    // Two members of M1 walk the same interactions with the same
    // semantics; dedup keeps one.
    let mut ctx2 = ctx;
    ctx2.adjacency.insert(d(11), vec![d(20)]);
    ctx2.def_modules.insert(d(11), (m(1), "app.m1".to_string()));
    ctx2.def_names.insert(d(11), "submitAgain".to_string());

    let entry_points = vec![EntryPoint {
        module_id: m(1),
        members: vec![
            member(d(10), Some(ActionType::Create), Some("customer")),
            member(d(11), Some(ActionType::Create), Some("customer")),
        ],
    }];

    let flows = trace_flows_from_entry_points(&ctx2, &entry_points);
    assert_eq!(flows.len(), 2);

    let kept = dedup_flows(flows, DEFAULT_OVERLAP_THRESHOLD);
    assert_eq!(kept.len(), 1);
}
