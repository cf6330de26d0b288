//! The LLM orchestration boundary.
//!
//! The core never calls a model; it exposes "what needs annotating next"
//! queries and accepts annotations and traced flows back. Everything here
//! is a thin read/write model over the store.

use crate::error::StoreResult;
use crate::flow::FlowSuggestion;
use crate::storage::{NewFlow, StoreHandle};
use crate::{DefinitionId, DefinitionKind, FlowId, RelationshipType};
use std::path::PathBuf;
use tracing::debug;

/// A call edge with no relationship annotation yet.
#[derive(Debug, Clone)]
pub struct PendingCallAnnotation {
    pub from_definition_id: DefinitionId,
    pub to_definition_id: DefinitionId,
    pub from_name: String,
    pub to_name: String,
    pub weight: u32,
}

/// An inheritance edge still carrying the placeholder semantic.
#[derive(Debug, Clone)]
pub struct PendingInheritanceAnnotation {
    pub from_definition_id: DefinitionId,
    pub to_definition_id: DefinitionId,
    pub from_name: String,
    pub to_name: String,
    pub relationship_type: RelationshipType,
}

/// Compact definition metadata handed to the annotator.
#[derive(Debug, Clone)]
pub struct DefinitionSummary {
    pub id: DefinitionId,
    pub name: String,
    pub kind: DefinitionKind,
    pub file_path: PathBuf,
    pub exported: bool,
    pub module_path: Option<String>,
}

/// A neighboring annotation on one side of a pair.
#[derive(Debug, Clone)]
pub struct PeerRelationship {
    pub other_definition_id: DefinitionId,
    pub other_name: String,
    pub relationship_type: RelationshipType,
    pub semantic: String,
}

/// Everything the annotator gets for one relationship: endpoint metadata,
/// peer relationships on each side, and shared domain tags.
#[derive(Debug, Clone)]
pub struct EnhancedRelationshipContext {
    pub source: DefinitionSummary,
    pub target: DefinitionSummary,
    pub source_peers: Vec<PeerRelationship>,
    pub target_peers: Vec<PeerRelationship>,
    pub shared_tags: Vec<String>,
}

/// Call edges awaiting their first annotation, heaviest first.
pub fn pending_call_annotations<H: StoreHandle>(
    handle: &H,
    limit: u32,
) -> StoreResult<Vec<PendingCallAnnotation>> {
    let definitions = handle.definitions();
    let mut out = Vec::new();
    for edge in handle.graph().unannotated_edges(limit)? {
        let (Some(from), Some(to)) = (
            definitions.get(edge.from_definition_id)?,
            definitions.get(edge.to_definition_id)?,
        ) else {
            continue;
        };
        out.push(PendingCallAnnotation {
            from_definition_id: edge.from_definition_id,
            to_definition_id: edge.to_definition_id,
            from_name: from.name,
            to_name: to.name,
            weight: edge.weight,
        });
    }
    Ok(out)
}

/// Placeholder-annotated inheritance edges awaiting narration.
pub fn pending_inheritance_annotations<H: StoreHandle>(
    handle: &H,
    limit: u32,
) -> StoreResult<Vec<PendingInheritanceAnnotation>> {
    let definitions = handle.definitions();
    let mut out = Vec::new();
    for relationship in handle.relationships().pending_inheritance(limit)? {
        let (Some(from), Some(to)) = (
            definitions.get(relationship.from_definition_id)?,
            definitions.get(relationship.to_definition_id)?,
        ) else {
            continue;
        };
        out.push(PendingInheritanceAnnotation {
            from_definition_id: relationship.from_definition_id,
            to_definition_id: relationship.to_definition_id,
            from_name: from.name,
            to_name: to.name,
            relationship_type: relationship.relationship_type,
        });
    }
    Ok(out)
}

/// Build the enhanced context for one relationship pair.
pub fn relationship_context<H: StoreHandle>(
    handle: &H,
    from: DefinitionId,
    to: DefinitionId,
) -> StoreResult<Option<EnhancedRelationshipContext>> {
    let Some(source) = summarize(handle, from)? else {
        return Ok(None);
    };
    let Some(target) = summarize(handle, to)? else {
        return Ok(None);
    };

    let source_peers = peers_of(handle, from, to)?;
    let target_peers = peers_of(handle, to, from)?;

    // Shared module-path segments act as domain tags.
    let shared_tags = match (&source.module_path, &target.module_path) {
        (Some(a), Some(b)) => {
            let b_segments: Vec<&str> = b.split('.').collect();
            a.split('.')
                .filter(|segment| b_segments.contains(segment))
                .map(str::to_string)
                .collect()
        }
        _ => Vec::new(),
    };

    Ok(Some(EnhancedRelationshipContext {
        source,
        target,
        source_peers,
        target_peers,
        shared_tags,
    }))
}

/// Record an annotation. Upsert preserves the stronger type: an
/// `extends`/`implements` row never downgrades to `uses`.
pub fn set_relationship_annotation<H: StoreHandle>(
    handle: &H,
    from: DefinitionId,
    to: DefinitionId,
    semantic: &str,
    relationship_type: RelationshipType,
) -> StoreResult<()> {
    handle
        .relationships()
        .annotate(from, to, semantic, relationship_type)?;
    Ok(())
}

/// Persist one traced flow, replacing any previous flow with the same
/// slug. Subflow slugs that do not name an existing flow are skipped.
pub fn persist_flow_suggestion<H: StoreHandle>(
    handle: &H,
    suggestion: &FlowSuggestion,
) -> StoreResult<FlowId> {
    let flows = handle.flows();

    if let Some(existing) = flows.get_by_slug(&suggestion.slug)? {
        flows.delete_cascade(existing.id)?;
    }

    let flow = flows.insert(&NewFlow {
        slug: suggestion.slug.clone(),
        display_name: suggestion.display_name.clone(),
        entry_definition_id: Some(suggestion.entry_definition_id),
        entry_module_id: Some(suggestion.entry_module_id),
        stakeholder: suggestion.stakeholder.clone(),
        action_type: suggestion.action_type,
        target_entity: suggestion.target_entity.clone(),
        tier: suggestion.tier,
        description: None,
    })?;

    for (order, interaction) in suggestion.interaction_ids.iter().enumerate() {
        flows.add_step(flow, order as u32, *interaction)?;
    }
    for (order, (from, to)) in suggestion.definition_steps.iter().enumerate() {
        flows.add_definition_step(flow, order as u32, *from, *to)?;
    }
    let mut order = 0u32;
    for slug in &suggestion.subflow_slugs {
        let Some(subflow) = flows.get_by_slug(slug)? else {
            debug!("subflow '{slug}' not persisted yet; skipping link");
            continue;
        };
        flows.add_subflow_step(flow, order, subflow.id)?;
        order += 1;
    }

    Ok(flow)
}

fn summarize<H: StoreHandle>(
    handle: &H,
    def: DefinitionId,
) -> StoreResult<Option<DefinitionSummary>> {
    let Some(record) = handle.definitions().get(def)? else {
        return Ok(None);
    };
    let file_path = handle
        .files()
        .get(record.file_id)?
        .map(|f| f.path)
        .unwrap_or_default();
    let module_path = match handle.modules().member_module(def)? {
        Some(module) => handle.modules().get(module)?.map(|m| m.full_path),
        None => None,
    };
    Ok(Some(DefinitionSummary {
        id: record.id,
        name: record.name,
        kind: record.kind,
        file_path,
        exported: record.exported,
        module_path,
    }))
}

fn peers_of<H: StoreHandle>(
    handle: &H,
    def: DefinitionId,
    exclude_other: DefinitionId,
) -> StoreResult<Vec<PeerRelationship>> {
    let definitions = handle.definitions();
    let mut peers = Vec::new();
    for relationship in handle.relationships().touching(def)? {
        let other = if relationship.from_definition_id == def {
            relationship.to_definition_id
        } else {
            relationship.from_definition_id
        };
        if other == exclude_other {
            continue;
        }
        let Some(record) = definitions.get(other)? else {
            continue;
        };
        peers.push(PeerRelationship {
            other_definition_id: other,
            other_name: record.name,
            relationship_type: relationship.relationship_type,
            semantic: relationship.semantic,
        });
    }
    Ok(peers)
}
