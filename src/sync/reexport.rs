//! Import resolution, including re-export chains.
//!
//! An imported symbol resolves to a definition ID by looking up the target
//! file's exported-definition map, falling back to following re-export
//! chains. Chains are walked with a visited set and a depth limit; at each
//! hop the in-memory parsed data is consulted when available, otherwise
//! the store's reference tables. Unresolved imports are legal and resolve
//! to `None`.

use crate::error::StoreResult;
use crate::parsing::{ParsedFile, ParsedImport};
use crate::storage::StoreHandle;
use crate::{DefinitionId, ImportKind, ReferenceKind};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::trace;

pub struct ImportResolver<'a, H: StoreHandle> {
    handle: &'a H,
    /// Freshly parsed files by relative path, consulted before the store
    /// so chains through not-yet-reinserted files still resolve.
    parsed: &'a HashMap<PathBuf, ParsedFile>,
    root: &'a Path,
    depth_limit: usize,
}

impl<'a, H: StoreHandle> ImportResolver<'a, H> {
    pub fn new(
        handle: &'a H,
        parsed: &'a HashMap<PathBuf, ParsedFile>,
        root: &'a Path,
        depth_limit: usize,
    ) -> Self {
        Self {
            handle,
            parsed,
            root,
            depth_limit,
        }
    }

    /// Resolve one imported symbol against a target file (relative path).
    ///
    /// Namespace imports have no single target definition and always
    /// resolve to `None`.
    pub fn resolve(
        &self,
        target: &Path,
        import: &ParsedImport,
    ) -> StoreResult<Option<DefinitionId>> {
        let wanted = match import.kind {
            ImportKind::Namespace => return Ok(None),
            ImportKind::Default => "default",
            ImportKind::Named => import.name.as_str(),
        };
        let mut visited = HashSet::new();
        self.resolve_in(target, wanted, &mut visited)
    }

    fn resolve_in(
        &self,
        file: &Path,
        name: &str,
        visited: &mut HashSet<PathBuf>,
    ) -> StoreResult<Option<DefinitionId>> {
        if !visited.insert(file.to_path_buf()) {
            return Ok(None); // cycle
        }
        if visited.len() > self.depth_limit {
            trace!("re-export depth limit hit at '{}'", file.display());
            return Ok(None);
        }

        let Some(record) = self.handle.files().get_by_path(file)? else {
            return Ok(None);
        };

        // Direct export wins.
        let exported = self.handle.definitions().exported_map(record.id)?;
        if let Some(&def) = exported.get(name) {
            return Ok(Some(def));
        }

        // Follow re-exports: parsed data when available, stored otherwise.
        if let Some(parsed) = self.parsed.get(file) {
            for reference in &parsed.references {
                let Some(resolved) = &reference.resolved_path else {
                    continue;
                };
                let Ok(next) = resolved.strip_prefix(self.root) else {
                    continue;
                };
                match reference.kind {
                    ReferenceKind::ReExport => {
                        for import in &reference.imports {
                            if import.local_name == name {
                                let inner = match import.kind {
                                    ImportKind::Default => "default",
                                    _ => import.name.as_str(),
                                };
                                if let Some(def) = self.resolve_in(next, inner, visited)? {
                                    return Ok(Some(def));
                                }
                            }
                        }
                    }
                    ReferenceKind::ExportAll => {
                        if let Some(def) = self.resolve_in(next, name, visited)? {
                            return Ok(Some(def));
                        }
                    }
                    ReferenceKind::Import => {}
                }
            }
        } else {
            let deps = self.handle.dependencies();
            for reference in deps.reexports_from(record.id)? {
                let Some(to_file) = reference.to_file_id else {
                    continue;
                };
                let Some(next) = self.handle.files().get(to_file)? else {
                    continue;
                };
                match reference.kind {
                    ReferenceKind::ReExport => {
                        for symbol in deps.symbols_of_reference(reference.id)? {
                            if symbol.local_name == name {
                                let inner = match symbol.kind {
                                    ImportKind::Default => "default".to_string(),
                                    _ => symbol.name.clone(),
                                };
                                if let Some(def) =
                                    self.resolve_in(&next.path, &inner, visited)?
                                {
                                    return Ok(Some(def));
                                }
                            }
                        }
                    }
                    ReferenceKind::ExportAll => {
                        if let Some(def) = self.resolve_in(&next.path, name, visited)? {
                            return Ok(Some(def));
                        }
                    }
                    ReferenceKind::Import => {}
                }
            }
        }

        Ok(None)
    }
}
