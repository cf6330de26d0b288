//! Inheritance edge derivation.
//!
//! Recreates `extends`/`implements` relationship rows from the name lists
//! stored on definitions. Targets are looked up by name across the index;
//! ambiguity is settled by exported-ness, then by file proximity to the
//! declaring file. Created rows carry the placeholder semantic and await
//! LLM narration. Re-running is idempotent: existing pairs create nothing.

use crate::error::StoreResult;
use crate::storage::{DefinitionRecord, StoreHandle};
use crate::{DefinitionId, RelationshipType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scan stored inheritance names and ensure a relationship row per edge.
/// Returns how many rows were created.
pub fn sync_inheritance_edges<H: StoreHandle>(handle: &H) -> StoreResult<u64> {
    let definitions = handle.definitions();
    let relationships = handle.relationships();

    let carriers = definitions.with_inheritance()?;
    if carriers.is_empty() {
        return Ok(0);
    }

    // File paths resolve proximity ties; memoize them.
    let mut paths: HashMap<crate::FileId, PathBuf> = HashMap::new();
    let mut path_of = |file_id: crate::FileId| -> StoreResult<PathBuf> {
        if let Some(path) = paths.get(&file_id) {
            return Ok(path.clone());
        }
        let path = handle
            .files()
            .get(file_id)?
            .map(|f| f.path)
            .unwrap_or_default();
        paths.insert(file_id, path.clone());
        Ok(path)
    };

    let mut created = 0u64;
    for def in &carriers {
        let source_path = path_of(def.file_id)?;
        for (name, relationship_type) in inheritance_names(def) {
            let candidates = definitions.by_name_global(name)?;
            let Some(target) = pick_target(def.id, &candidates, &source_path, &mut path_of)?
            else {
                debug!("no target named '{name}' for definition {}", def.id);
                continue;
            };
            if relationships.ensure_inheritance(def.id, target, relationship_type)? {
                created += 1;
            }
        }
    }
    Ok(created)
}

/// The declared inheritance names of a stored definition, in scan order.
fn inheritance_names(def: &DefinitionRecord) -> Vec<(&str, RelationshipType)> {
    let mut names = Vec::new();
    if let Some(extends) = def.extends_name.as_deref() {
        names.push((extends, RelationshipType::Extends));
    }
    for name in &def.extends_all_names {
        names.push((name.as_str(), RelationshipType::Extends));
    }
    for name in &def.implements_names {
        names.push((name.as_str(), RelationshipType::Implements));
    }
    names
}

/// Disambiguation: exported candidates first, then the one whose file
/// shares the longest path prefix with the declaring file.
fn pick_target(
    source: DefinitionId,
    candidates: &[DefinitionRecord],
    source_path: &Path,
    path_of: &mut impl FnMut(crate::FileId) -> StoreResult<PathBuf>,
) -> StoreResult<Option<DefinitionId>> {
    let mut best: Option<(bool, usize, DefinitionId)> = None;
    for candidate in candidates {
        if candidate.id == source {
            continue;
        }
        let candidate_path = path_of(candidate.file_id)?;
        let proximity = shared_prefix_len(source_path, &candidate_path);
        let key = (candidate.exported, proximity, candidate.id);
        let better = match &best {
            None => true,
            // Exported beats not; then closer file; a lower ID settles the
            // rest deterministically.
            Some((exported, best_proximity, best_id)) => {
                (candidate.exported, proximity) > (*exported, *best_proximity)
                    || ((candidate.exported, proximity) == (*exported, *best_proximity)
                        && candidate.id < *best_id)
            }
        };
        if better {
            best = Some(key);
        }
    }
    Ok(best.map(|(_, _, id)| id))
}

fn shared_prefix_len(a: &Path, b: &Path) -> usize {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .count()
}
