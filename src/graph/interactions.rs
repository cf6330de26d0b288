//! Module-level interaction derivation.
//!
//! Projects the definition call graph through module membership: every
//! ordered module pair with at least one edge gets an interaction row with
//! `source='ast'`, summed weight, and a compact symbol list. Same-module
//! edges collapse. Cross-module inheritance relationships are also
//! guaranteed an interaction row, even without call evidence.

use crate::error::StoreResult;
use crate::storage::StoreHandle;
use crate::{DefinitionId, ModuleId, RelationshipType};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

/// Upsert `source='ast'` interactions from the call graph. Returns the
/// number of module pairs touched.
pub fn derive_ast_interactions<H: StoreHandle>(handle: &H) -> StoreResult<u64> {
    let membership = handle.modules().membership()?;
    if membership.is_empty() {
        return Ok(0);
    }

    let edges = handle.graph().all_edges()?;

    // Aggregate per ordered module pair, preserving first-seen order so
    // repeated derivations write identical rows.
    let mut pairs: IndexMap<(ModuleId, ModuleId), (u32, Vec<String>)> = IndexMap::new();
    let mut names: HashMap<DefinitionId, String> = HashMap::new();
    let mut name_of = |handle: &H, def: DefinitionId| -> StoreResult<String> {
        if let Some(name) = names.get(&def) {
            return Ok(name.clone());
        }
        let name = handle
            .definitions()
            .get(def)?
            .map(|d| d.name)
            .unwrap_or_else(|| format!("#{def}"));
        names.insert(def, name.clone());
        Ok(name)
    };

    for edge in &edges {
        let (Some(&from_module), Some(&to_module)) = (
            membership.get(&edge.from_definition_id),
            membership.get(&edge.to_definition_id),
        ) else {
            continue;
        };
        if from_module == to_module {
            continue;
        }
        let entry = pairs.entry((from_module, to_module)).or_default();
        entry.0 += edge.weight;
        if entry.1.len() < 20 {
            let from_name = name_of(handle, edge.from_definition_id)?;
            let to_name = name_of(handle, edge.to_definition_id)?;
            entry.1.push(format!("{from_name} -> {to_name}"));
        }
    }

    let interactions = handle.interactions();
    for ((from, to), (weight, symbols)) in &pairs {
        interactions.upsert_ast(*from, *to, *weight, symbols)?;
    }

    debug!(pairs = pairs.len(), "ast interactions derived");
    Ok(pairs.len() as u64)
}

/// Guarantee that every cross-module `extends`/`implements` relationship
/// has an interaction row for its module pair. Returns rows created.
pub fn ensure_inheritance_interactions<H: StoreHandle>(handle: &H) -> StoreResult<u64> {
    let membership = handle.modules().membership()?;
    if membership.is_empty() {
        return Ok(0);
    }

    let interactions = handle.interactions();
    let mut created = 0u64;
    for relationship in handle.relationships().all()? {
        if relationship.relationship_type == RelationshipType::Uses {
            continue;
        }
        let (Some(&from_module), Some(&to_module)) = (
            membership.get(&relationship.from_definition_id),
            membership.get(&relationship.to_definition_id),
        ) else {
            continue;
        };
        if from_module == to_module {
            continue;
        }
        if interactions.get_by_pair(from_module, to_module)?.is_none() {
            interactions.upsert_ast(from_module, to_module, 0, &[])?;
            created += 1;
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{Language, ParsedDefinition};
    use crate::storage::{IndexStore, StoreHandle};
    use crate::{DefinitionKind, FileId, InteractionSource, Position};
    use std::path::Path;

    fn fixture() -> (IndexStore, FileId) {
        let store = IndexStore::open_in_memory().unwrap();
        let file = store
            .files()
            .insert(Path::new("a.ts"), Language::TypeScript, "h", 1, 0)
            .unwrap();
        (store, file)
    }

    fn def(store: &IndexStore, file: FileId, name: &str, start: u32, end: u32) -> DefinitionId {
        store
            .definitions()
            .insert(
                file,
                &ParsedDefinition {
                    name: name.to_string(),
                    kind: DefinitionKind::Function,
                    exported: true,
                    default_export: false,
                    start: Position::new(start, 0),
                    end: Position::new(end, 0),
                    declaration_end: None,
                    extends: None,
                    implements: Vec::new(),
                    extends_all: Vec::new(),
                },
            )
            .unwrap()
    }

    fn call_edge(store: &IndexStore, from: DefinitionId, to: DefinitionId, weight: u32) {
        store
            .raw()
            .execute(
                "INSERT INTO call_edges (from_definition_id, to_definition_id, weight, min_usage_line)
                 VALUES (?1, ?2, ?3, 1)",
                rusqlite::params![from, to, weight],
            )
            .unwrap();
    }

    #[test]
    fn test_cross_module_pairs_aggregate() {
        let (store, file) = fixture();
        let a = def(&store, file, "a", 0, 4);
        let b = def(&store, file, "b", 5, 9);
        let c = def(&store, file, "c", 10, 14);

        let modules = store.modules();
        let root = modules.insert(None, "app", "App", false).unwrap();
        let m1 = modules.insert(Some(root), "m1", "M1", false).unwrap();
        let m2 = modules.insert(Some(root), "m2", "M2", false).unwrap();
        modules.assign_member(a, m1).unwrap();
        modules.assign_member(b, m1).unwrap();
        modules.assign_member(c, m2).unwrap();

        call_edge(&store, a, c, 2);
        call_edge(&store, b, c, 3);
        call_edge(&store, a, b, 9); // same module, collapsed

        assert_eq!(derive_ast_interactions(&store).unwrap(), 1);

        let row = store.interactions().get_by_pair(m1, m2).unwrap().unwrap();
        assert_eq!(row.weight, 5);
        assert_eq!(row.source, InteractionSource::Ast);
        assert_eq!(row.symbols.len(), 2);
        assert!(row.symbols.contains(&"a -> c".to_string()));

        // Re-derivation is stable.
        assert_eq!(derive_ast_interactions(&store).unwrap(), 1);
        assert_eq!(store.interactions().count().unwrap(), 1);
    }

    #[test]
    fn test_unassigned_definitions_skipped() {
        let (store, file) = fixture();
        let a = def(&store, file, "a", 0, 4);
        let b = def(&store, file, "b", 5, 9);

        store.modules().insert(None, "app", "App", false).unwrap();
        call_edge(&store, a, b, 1);

        assert_eq!(derive_ast_interactions(&store).unwrap(), 0);
    }

    #[test]
    fn test_inheritance_pair_gets_interaction() {
        let (store, file) = fixture();
        let child = def(&store, file, "Child", 0, 4);
        let base = def(&store, file, "Base", 5, 9);

        let modules = store.modules();
        let root = modules.insert(None, "app", "App", false).unwrap();
        let m1 = modules.insert(Some(root), "m1", "M1", false).unwrap();
        let m2 = modules.insert(Some(root), "m2", "M2", false).unwrap();
        modules.assign_member(child, m1).unwrap();
        modules.assign_member(base, m2).unwrap();

        store
            .relationships()
            .ensure_inheritance(child, base, RelationshipType::Extends)
            .unwrap();

        assert_eq!(ensure_inheritance_interactions(&store).unwrap(), 1);
        assert!(store.interactions().get_by_pair(m1, m2).unwrap().is_some());

        // Idempotent.
        assert_eq!(ensure_inheritance_interactions(&store).unwrap(), 0);
    }
}
