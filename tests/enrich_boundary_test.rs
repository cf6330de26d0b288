//! The enrichment boundary end-to-end: pending-annotation queues, the
//! enhanced relationship context, and flow persistence from a real trace.

mod common;

use codatlas::enrich;
use codatlas::flow::{trace_flows_from_entry_points, EntryMember, EntryPoint, TraceContext};
use codatlas::storage::{IndexStore, NewFlow, StoreHandle};
use codatlas::sync::SyncEngine;
use codatlas::{ActionType, InteractionSource, RelationshipType, Settings};
use common::StubParser;
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

/// ui/submit.ts calls data/save.ts; a contract-matched interaction bridges
/// data -> reports.
struct Fixture {
    store: IndexStore,
    _temp: TempDir,
    run: codatlas::DefinitionId,
    save: codatlas::DefinitionId,
    report: codatlas::DefinitionId,
    ui: codatlas::ModuleId,
    data: codatlas::ModuleId,
    reports: codatlas::ModuleId,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(
        root.join("submit.ts"),
        "def function run 0 4 exported\nimport save ./save\nusage save 2 call\n",
    )
    .unwrap();
    fs::write(root.join("save.ts"), "def function save 0 2 exported\n").unwrap();
    fs::write(root.join("report.ts"), "def function report 0 2 exported\n").unwrap();

    let mut store = IndexStore::open_in_memory().unwrap();
    let settings = Settings::default();
    let parser = StubParser;
    SyncEngine::new(&mut store, &parser, &settings)
        .sync(root)
        .unwrap();

    let file = |rel: &str| store.files().get_by_path(std::path::Path::new(rel)).unwrap().unwrap().id;
    let def = |rel: &str, name: &str| {
        store
            .definitions()
            .get_by_name(file(rel), name)
            .unwrap()
            .unwrap()
    };
    let run = def("submit.ts", "run");
    let save = def("save.ts", "save");
    let report = def("report.ts", "report");

    let modules = store.modules();
    let app = modules.insert(None, "app", "App", false).unwrap();
    let ui = modules.insert(Some(app), "ui", "UI", false).unwrap();
    let data = modules.insert(Some(app), "data", "Data", false).unwrap();
    let reports = modules.insert(Some(app), "reports", "Reports", false).unwrap();
    modules.assign_member(run, ui).unwrap();
    modules.assign_member(save, data).unwrap();
    modules.assign_member(report, reports).unwrap();

    // Re-derive interactions now that modules exist.
    codatlas::graph::derive_ast_interactions(&store).unwrap();

    // The enrichment pipeline supplies a contract-matched bridge with a
    // definition-level link.
    let bridge = store
        .interactions()
        .upsert_inferred(
            data,
            reports,
            InteractionSource::ContractMatched,
            Some("save feeds reporting"),
            Some(0.9),
        )
        .unwrap();
    store
        .interactions()
        .insert_link(bridge, save, report, InteractionSource::ContractMatched)
        .unwrap();

    Fixture {
        store,
        _temp: temp,
        run,
        save,
        report,
        ui,
        data,
        reports,
    }
}

#[test]
fn test_pending_call_annotations_queue() {
    let f = fixture();

    let pending = enrich::pending_call_annotations(&f.store, 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].from_name, "run");
    assert_eq!(pending[0].to_name, "save");

    enrich::set_relationship_annotation(
        &f.store,
        f.run,
        f.save,
        "run persists customer input",
        RelationshipType::Uses,
    )
    .unwrap();

    assert!(enrich::pending_call_annotations(&f.store, 10).unwrap().is_empty());
}

#[test]
fn test_relationship_context_carries_modules_and_peers() {
    let f = fixture();

    enrich::set_relationship_annotation(&f.store, f.run, f.save, "x", RelationshipType::Uses)
        .unwrap();
    enrich::set_relationship_annotation(
        &f.store,
        f.save,
        f.report,
        "save feeds report",
        RelationshipType::Uses,
    )
    .unwrap();

    let ctx = enrich::relationship_context(&f.store, f.run, f.save)
        .unwrap()
        .unwrap();
    assert_eq!(ctx.source.name, "run");
    assert_eq!(ctx.source.module_path.as_deref(), Some("app.ui"));
    assert_eq!(ctx.target.module_path.as_deref(), Some("app.data"));
    assert_eq!(ctx.shared_tags, vec!["app".to_string()]);

    // The target's other relationship shows up as a peer.
    assert_eq!(ctx.target_peers.len(), 1);
    assert_eq!(ctx.target_peers[0].other_name, "report");
    assert!(ctx.source_peers.is_empty());
}

#[test]
fn test_trace_and_persist_flow() {
    let f = fixture();

    // An atomic flow covers the ui->data interaction.
    let ast = f
        .store
        .interactions()
        .get_by_pair(f.ui, f.data)
        .unwrap()
        .unwrap();
    let atomic = f
        .store
        .flows()
        .insert(&NewFlow {
            slug: "ui-to-data".to_string(),
            display_name: "UiToData".to_string(),
            tier: 0,
            ..Default::default()
        })
        .unwrap();
    f.store.flows().add_step(atomic, 0, ast.id).unwrap();

    let ctx = TraceContext::load(&f.store, HashSet::from([f.ui])).unwrap();
    let suggestions = trace_flows_from_entry_points(
        &ctx,
        &[EntryPoint {
            module_id: f.ui,
            members: vec![EntryMember {
                definition_id: f.run,
                action_type: Some(ActionType::Create),
                target_entity: Some("customer".to_string()),
                trace_from: None,
                stakeholder: Some("operator".to_string()),
            }],
        }],
    );
    assert_eq!(suggestions.len(), 1);

    let suggestion = &suggestions[0];
    assert_eq!(suggestion.display_name, "CreateCustomerFlow");
    // The walk crosses ui->data, then bridges data->reports at the leaf.
    let bridge = f
        .store
        .interactions()
        .get_by_pair(f.data, f.reports)
        .unwrap()
        .unwrap();
    assert_eq!(suggestion.interaction_ids, vec![ast.id, bridge.id]);
    assert_eq!(suggestion.subflow_slugs, vec!["ui-to-data".to_string()]);
    assert_eq!(suggestion.inferred_steps.len(), 1);
    assert_eq!(
        suggestion.inferred_steps[0].source,
        InteractionSource::ContractMatched
    );
    assert_eq!(suggestion.inferred_steps[0].to_definition, Some(f.report));

    // Persist, then persist again: same-slug replacement, no duplicates.
    enrich::persist_flow_suggestion(&f.store, suggestion).unwrap();
    enrich::persist_flow_suggestion(&f.store, suggestion).unwrap();
    assert_eq!(f.store.flows().count().unwrap(), 2); // atomic + composite

    let persisted = f
        .store
        .flows()
        .get_by_slug("create-customer-flow")
        .unwrap()
        .unwrap();
    assert_eq!(persisted.tier, 1);
    assert_eq!(persisted.entry_definition_id, Some(f.run));
    assert_eq!(persisted.entry_module_id, Some(f.ui));
    assert_eq!(persisted.action_type, Some(ActionType::Create));

    let steps = f.store.flows().steps(persisted.id).unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].interaction_id, ast.id);
    assert_eq!(steps[1].interaction_id, bridge.id);

    assert_eq!(
        f.store.flows().subflow_steps(persisted.id).unwrap(),
        vec![atomic]
    );
    assert!(!f.store.flows().definition_steps(persisted.id).unwrap().is_empty());
}
