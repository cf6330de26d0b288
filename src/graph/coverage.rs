//! Interaction coverage diagnostics.
//!
//! A relationship is covered iff it is cross-module and its module pair
//! has at least one interaction. Same-module relationships and orphaned
//! ones (no backing call edge) land in their own buckets so the
//! enrichment pipeline can see what it is missing.

use crate::error::StoreResult;
use crate::storage::StoreHandle;
use crate::{DefinitionId, RelationshipId};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageBucket {
    /// Cross-module with an interaction row.
    Covered,
    /// Both endpoints live in the same module.
    SameModule,
    /// No call edge backs this relationship.
    Orphaned,
    /// Cross-module but no interaction row yet.
    Uncovered,
    /// An endpoint has no module assignment.
    Unassigned,
}

#[derive(Debug, Default)]
pub struct CoverageReport {
    pub covered: Vec<RelationshipId>,
    pub same_module: Vec<RelationshipId>,
    pub orphaned: Vec<RelationshipId>,
    pub uncovered: Vec<RelationshipId>,
    pub unassigned: Vec<RelationshipId>,
}

impl CoverageReport {
    pub fn total(&self) -> usize {
        self.covered.len()
            + self.same_module.len()
            + self.orphaned.len()
            + self.uncovered.len()
            + self.unassigned.len()
    }
}

/// Classify every relationship into its coverage bucket.
pub fn coverage_report<H: StoreHandle>(handle: &H) -> StoreResult<CoverageReport> {
    let membership = handle.modules().membership()?;
    let call_edges: HashSet<(DefinitionId, DefinitionId)> = handle
        .graph()
        .all_edges()?
        .into_iter()
        .map(|e| (e.from_definition_id, e.to_definition_id))
        .collect();

    let interactions = handle.interactions();
    let mut report = CoverageReport::default();

    for relationship in handle.relationships().all()? {
        let bucket = if !call_edges
            .contains(&(relationship.from_definition_id, relationship.to_definition_id))
        {
            CoverageBucket::Orphaned
        } else {
            match (
                membership.get(&relationship.from_definition_id),
                membership.get(&relationship.to_definition_id),
            ) {
                (Some(from), Some(to)) if from == to => CoverageBucket::SameModule,
                (Some(from), Some(to)) => {
                    if interactions.get_by_pair(*from, *to)?.is_some() {
                        CoverageBucket::Covered
                    } else {
                        CoverageBucket::Uncovered
                    }
                }
                _ => CoverageBucket::Unassigned,
            }
        };

        match bucket {
            CoverageBucket::Covered => report.covered.push(relationship.id),
            CoverageBucket::SameModule => report.same_module.push(relationship.id),
            CoverageBucket::Orphaned => report.orphaned.push(relationship.id),
            CoverageBucket::Uncovered => report.uncovered.push(relationship.id),
            CoverageBucket::Unassigned => report.unassigned.push(relationship.id),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{Language, ParsedDefinition};
    use crate::storage::{IndexStore, StoreHandle};
    use crate::{DefinitionKind, Position, RelationshipType};
    use std::path::Path;

    #[test]
    fn test_buckets() {
        let store = IndexStore::open_in_memory().unwrap();
        let file = store
            .files()
            .insert(Path::new("a.ts"), Language::TypeScript, "h", 1, 0)
            .unwrap();
        let mk = |name: &str, start: u32| ParsedDefinition {
            name: name.to_string(),
            kind: DefinitionKind::Function,
            exported: true,
            default_export: false,
            start: Position::new(start, 0),
            end: Position::new(start + 3, 0),
            declaration_end: None,
            extends: None,
            implements: Vec::new(),
            extends_all: Vec::new(),
        };
        let defs = store.definitions();
        let a = defs.insert(file, &mk("a", 0)).unwrap();
        let b = defs.insert(file, &mk("b", 10)).unwrap();
        let c = defs.insert(file, &mk("c", 20)).unwrap();
        let d = defs.insert(file, &mk("d", 30)).unwrap();

        let modules = store.modules();
        let root = modules.insert(None, "app", "App", false).unwrap();
        let m1 = modules.insert(Some(root), "m1", "M1", false).unwrap();
        let m2 = modules.insert(Some(root), "m2", "M2", false).unwrap();
        modules.assign_member(a, m1).unwrap();
        modules.assign_member(b, m2).unwrap();
        modules.assign_member(c, m1).unwrap();
        modules.assign_member(d, m1).unwrap();

        let mut edge = |from: DefinitionId, to: DefinitionId| {
            store
                .raw()
                .execute(
                    "INSERT INTO call_edges (from_definition_id, to_definition_id, weight, min_usage_line)
                     VALUES (?1, ?2, 1, 1)",
                    rusqlite::params![from, to],
                )
                .unwrap();
        };
        edge(a, b); // cross-module, will be covered
        edge(c, d); // same module

        let rels = store.relationships();
        rels.annotate(a, b, "a calls b", RelationshipType::Uses).unwrap();
        rels.annotate(c, d, "c calls d", RelationshipType::Uses).unwrap();
        // No call edge behind this one.
        rels.ensure_inheritance(d, b, RelationshipType::Extends).unwrap();

        store.interactions().upsert_ast(m1, m2, 1, &[]).unwrap();

        let report = coverage_report(&store).unwrap();
        assert_eq!(report.covered.len(), 1);
        assert_eq!(report.same_module.len(), 1);
        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.uncovered.len(), 0);
        assert_eq!(report.total(), 3);
    }
}
