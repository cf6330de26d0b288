//! The incremental sync engine.
//!
//! Brings the store into agreement with the on-disk tree with minimal
//! work. The pipeline is strictly phased: all I/O (walking, reading,
//! parsing) completes before the store transaction opens, then one
//! exclusive transaction applies deletes, reconciles modified files,
//! inserts new ones, re-resolves references, reworks dependents, scrubs
//! dangling rows, and runs post-sync derivations. A crash inside the
//! transaction rolls the whole sync back.
//!
//! Per-file parse failures are warnings: the file keeps its stored state
//! and is retried on the next sync.

use crate::config::Settings;
use crate::error::IndexResult;
use crate::parsing::{ParseContext, ParsedFile, SourceParser, WorkspaceMap};
use crate::storage::{IndexStore, StoreHandle, StoreTransaction};
use crate::sync::change::{ChangeDetector, ChangeSet, FileChange};
use crate::sync::dirty::{propagate, DirtySets};
use crate::sync::reexport::ImportResolver;
use crate::{DefinitionId, DefinitionKind, FileId, ImportKind, ModuleId};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What one sync invocation did.
#[derive(Debug, Default)]
pub struct SyncResult {
    pub files_added: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub definitions_added: usize,
    pub definitions_updated: usize,
    pub definitions_removed: usize,
    pub references_rebuilt: usize,
    pub call_edges: u64,
    pub ghost_rows_removed: u64,
    pub warnings: Vec<SyncWarning>,
}

impl SyncResult {
    pub fn is_noop(&self) -> bool {
        self.files_added == 0 && self.files_modified == 0 && self.files_deleted == 0
    }
}

/// A recoverable per-file problem. The file is skipped and retried on the
/// next sync.
#[derive(Debug, Clone)]
pub struct SyncWarning {
    pub path: PathBuf,
    pub reason: String,
}

pub struct SyncEngine<'a, P: SourceParser> {
    store: &'a mut IndexStore,
    parser: &'a P,
    settings: &'a Settings,
}

impl<'a, P: SourceParser> SyncEngine<'a, P> {
    pub fn new(store: &'a mut IndexStore, parser: &'a P, settings: &'a Settings) -> Self {
        Self {
            store,
            parser,
            settings,
        }
    }

    /// Detect changes under `root` and apply them.
    pub fn sync(&mut self, root: &Path) -> IndexResult<SyncResult> {
        let change_set = ChangeDetector::new(self.settings).detect(root, self.store)?;
        self.apply(root, change_set)
    }

    /// Apply a pre-computed change set. Split from [`sync`](Self::sync) so
    /// tests can drive the pipeline with a scripted detector.
    pub fn apply(&mut self, root: &Path, change_set: ChangeSet) -> IndexResult<SyncResult> {
        let mut result = SyncResult::default();

        if change_set.is_empty() {
            // Nothing to do beyond honoring "cleared at next sync start".
            let tx = self.store.begin_sync()?;
            tx.sync_dirty().clear()?;
            tx.commit()?;
            debug!("sync is a no-op");
            return Ok(result);
        }

        let workspace = WorkspaceMap::new(root, &self.settings.workspace_aliases);

        // Partition the change set.
        let mut added = Vec::new();
        let mut modified = Vec::new();
        let mut deleted = Vec::new();
        for change in change_set.changes {
            match change {
                FileChange::Added { .. } => added.push(change),
                FileChange::Modified { .. } => modified.push(change),
                FileChange::Deleted { file_id, path } => deleted.push((file_id, path)),
            }
        }

        // ---- Parse phase: every read and parse happens before the
        // transaction opens.
        let changed_stored_ids: Vec<FileId> = modified
            .iter()
            .filter_map(|c| match c {
                FileChange::Modified { file_id, .. } => Some(*file_id),
                _ => None,
            })
            .chain(deleted.iter().map(|(id, _)| *id))
            .collect();

        let dependents =
            self.collect_dependents(root, &changed_stored_ids, &modified, &change_set.on_disk)?;

        let (parsed_files, parse_warnings) = self.parse_all(
            root,
            &added,
            &modified,
            &dependents,
            &change_set.on_disk,
            &workspace,
        );
        result.warnings = parse_warnings;

        // Drop changes whose parse failed; those files stay at prior state.
        added.retain(|c| parsed_files.contains_key(c.path()));
        modified.retain(|c| parsed_files.contains_key(c.path()));
        let dependents: Vec<(FileId, PathBuf)> = dependents
            .into_iter()
            .filter(|(_, rel)| parsed_files.contains_key(rel.as_path()))
            .collect();

        result.files_added = added.len();
        result.files_modified = modified.len();
        result.files_deleted = deleted.len();

        // ---- Mutation phase: one exclusive transaction, no suspension
        // points inside.
        let tx = self.store.begin_sync()?;
        tx.sync_dirty().clear()?;

        let mut sets = DirtySets::default();

        // Phase 1: deletes, with module snapshots taken before the cascade.
        for (file_id, path) in &deleted {
            debug!("deleting '{}'", path.display());
            delete_file_subtree(&tx, *file_id, &mut sets, &mut result)?;
        }

        // Phase 3: reconcile modified files by (name, kind) identity.
        let mut touched: Vec<(FileId, PathBuf)> = Vec::new();
        for change in &modified {
            let FileChange::Modified {
                file_id,
                path,
                hash,
                size,
                mtime,
                ..
            } = change
            else {
                unreachable!("partitioned above");
            };
            let parsed = &parsed_files[path.as_path()];
            reconcile_file(&tx, *file_id, parsed, &mut sets, &mut result)?;
            tx.files().update_content(*file_id, hash, *size, *mtime)?;
            tx.dependencies().delete_file_dependencies(*file_id)?;
            touched.push((*file_id, path.clone()));
        }

        // Phase 4: brand-new files.
        for change in &added {
            let FileChange::Added {
                path,
                language,
                hash,
                size,
                mtime,
                ..
            } = change
            else {
                unreachable!("partitioned above");
            };
            let parsed = &parsed_files[path.as_path()];
            let file_id = tx.files().insert(path, *language, hash, *size, *mtime)?;
            for def in &parsed.definitions {
                let id = tx.definitions().insert(file_id, def)?;
                sets.added.push(id);
                result.definitions_added += 1;
            }
            touched.push((file_id, path.clone()));
        }

        // Phase 5: rebuild references for every touched file.
        let reexport_depth = self.settings.indexing.reexport_depth;
        let resolver = ImportResolver::new(&tx, &parsed_files, root, reexport_depth);
        for (file_id, rel) in &touched {
            let parsed = &parsed_files[rel.as_path()];
            result.references_rebuilt +=
                insert_dependencies(&tx, &resolver, root, *file_id, parsed, None)?;
        }

        // Phase 6: unchanged dependents re-resolve their rows that pointed
        // at changed files.
        let touched_ids: HashSet<FileId> = touched.iter().map(|(id, _)| *id).collect();
        let changed_for_dependents: Vec<FileId> = changed_stored_ids
            .iter()
            .filter(|id| touched_ids.contains(*id) || deleted.iter().any(|(d, _)| d == *id))
            .copied()
            .collect();
        for (dep_id, rel) in &dependents {
            if touched_ids.contains(dep_id) {
                continue;
            }
            let parsed = &parsed_files[rel.as_path()];
            let stale_sources: HashSet<String> = tx
                .dependencies()
                .references_from(*dep_id)?
                .into_iter()
                .filter(|r| {
                    r.to_file_id
                        .is_some_and(|to| changed_for_dependents.contains(&to))
                })
                .map(|r| r.source)
                .collect();
            if stale_sources.is_empty() {
                continue;
            }
            tx.dependencies()
                .delete_dependencies_on(*dep_id, &changed_for_dependents)?;
            result.references_rebuilt +=
                insert_dependencies(&tx, &resolver, root, *dep_id, parsed, Some(&stale_sources))?;
        }

        // Phase 7: dangling cleanup.
        tx.dependencies().delete_dangling()?;

        // Phase 8: post-sync derivations and dirty propagation.
        crate::graph::sync_inheritance_edges(&tx)?;
        result.call_edges = tx.graph().rebuild()?;
        if tx.modules().count()? > 0 {
            crate::graph::derive_ast_interactions(&tx)?;
            crate::graph::ensure_inheritance_interactions(&tx)?;
        }
        result.ghost_rows_removed = tx.ghosts().scrub()?;
        propagate(&tx, &sets)?;
        tx.metadata()
            .set("last_sync_utc", &chrono::Utc::now().timestamp().to_string())?;

        tx.commit()?;

        info!(
            added = result.files_added,
            modified = result.files_modified,
            deleted = result.files_deleted,
            defs_added = result.definitions_added,
            defs_updated = result.definitions_updated,
            defs_removed = result.definitions_removed,
            "sync committed"
        );
        Ok(result)
    }

    /// Unchanged files that import into a changed file; they are
    /// pre-parsed so phase 6 never touches the disk.
    fn collect_dependents(
        &self,
        root: &Path,
        changed_ids: &[FileId],
        modified: &[FileChange],
        on_disk: &HashSet<PathBuf>,
    ) -> IndexResult<Vec<(FileId, PathBuf)>> {
        if changed_ids.is_empty() {
            return Ok(Vec::new());
        }
        let modified_ids: HashSet<FileId> = modified
            .iter()
            .filter_map(|c| match c {
                FileChange::Modified { file_id, .. } => Some(*file_id),
                _ => None,
            })
            .collect();

        let mut out = Vec::new();
        for dep_id in self.store.dependencies().files_importing(changed_ids)? {
            if modified_ids.contains(&dep_id) || changed_ids.contains(&dep_id) {
                continue;
            }
            let Some(record) = self.store.files().get(dep_id)? else {
                continue;
            };
            if on_disk.contains(&root.join(&record.path)) {
                out.push((dep_id, record.path));
            }
        }
        Ok(out)
    }

    /// Parse changed files and dependents in parallel. Returns parsed
    /// files keyed by relative path plus warnings for failures.
    fn parse_all(
        &self,
        root: &Path,
        added: &[FileChange],
        modified: &[FileChange],
        dependents: &[(FileId, PathBuf)],
        on_disk: &HashSet<PathBuf>,
        workspace: &WorkspaceMap,
    ) -> (HashMap<PathBuf, ParsedFile>, Vec<SyncWarning>) {
        struct Job {
            rel: PathBuf,
            content: String,
            mtime: i64,
        }

        let mut jobs = Vec::new();
        for change in added.iter().chain(modified.iter()) {
            match change {
                FileChange::Added {
                    path,
                    content,
                    mtime,
                    ..
                }
                | FileChange::Modified {
                    path,
                    content,
                    mtime,
                    ..
                } => jobs.push(Job {
                    rel: path.clone(),
                    content: content.clone(),
                    mtime: *mtime,
                }),
                FileChange::Deleted { .. } => {}
            }
        }
        for (_, rel) in dependents {
            let abs = root.join(rel);
            match std::fs::read_to_string(&abs) {
                Ok(content) => jobs.push(Job {
                    rel: rel.clone(),
                    content,
                    mtime: 0,
                }),
                Err(e) => warn!("cannot re-read dependent '{}': {e}", rel.display()),
            }
        }

        let ctx = ParseContext {
            known_files: on_disk,
            workspace,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.indexing.parallel_threads.max(1))
            .build();

        // Captured by the worker closure instead of `self`: the store's
        // connection is not Sync and must stay off the parse threads.
        let parser = self.parser;
        let parse_one = |job: &Job| -> (PathBuf, Result<ParsedFile, String>) {
            let abs = root.join(&job.rel);
            let outcome = parser
                .parse_file(&abs, &job.content, job.mtime, &ctx)
                .map_err(|e| e.to_string());
            (job.rel.clone(), outcome)
        };

        let outcomes: Vec<(PathBuf, Result<ParsedFile, String>)> = match pool {
            Ok(pool) => pool.install(|| jobs.par_iter().map(parse_one).collect()),
            Err(e) => {
                warn!("falling back to serial parsing: {e}");
                jobs.iter().map(parse_one).collect()
            }
        };

        let mut parsed = HashMap::new();
        let mut warnings = Vec::new();
        for (rel, outcome) in outcomes {
            match outcome {
                Ok(file) => {
                    parsed.insert(rel, file);
                }
                Err(reason) => {
                    warn!("parse failed for '{}': {reason}", rel.display());
                    warnings.push(SyncWarning { path: rel, reason });
                }
            }
        }
        (parsed, warnings)
    }

}

/// Phase 1 cascade: snapshot module membership, then remove the file and
/// everything under it.
fn delete_file_subtree(
    tx: &StoreTransaction<'_>,
    file_id: FileId,
    sets: &mut DirtySets,
    result: &mut SyncResult,
) -> IndexResult<()> {
    let def_ids = tx.definitions().ids_by_file(file_id)?;
    let snapshot = tx.modules().modules_of(&def_ids)?;

    tx.dependencies().delete_file_dependencies(file_id)?;
    for def in def_ids {
        delete_definition(tx, def, snapshot.get(&def).copied(), sets)?;
        result.definitions_removed += 1;
    }
    tx.files().delete(file_id)?;
    Ok(())
}

fn delete_definition(
    tx: &StoreTransaction<'_>,
    def: DefinitionId,
    module: Option<ModuleId>,
    sets: &mut DirtySets,
) -> IndexResult<()> {
    for relationship in tx.relationships().touching(def)? {
        tx.relationships().delete(relationship.id)?;
    }
    tx.modules().remove_member(def)?;
    tx.definitions().delete(def)?;
    sets.removed.push((def, module));
    Ok(())
}

/// Phase 3: match new definitions to old by `(name, kind)`. Matched rows
/// keep their IDs; unmatched-old rows cascade; unmatched-new rows insert.
fn reconcile_file(
    tx: &StoreTransaction<'_>,
    file_id: FileId,
    parsed: &ParsedFile,
    sets: &mut DirtySets,
    result: &mut SyncResult,
) -> IndexResult<()> {
    let old_defs = tx.definitions().by_file(file_id)?;
    let mut by_identity: HashMap<(String, DefinitionKind), VecDeque<DefinitionId>> = HashMap::new();
    for old in &old_defs {
        by_identity
            .entry((old.name.clone(), old.kind))
            .or_default()
            .push_back(old.id);
    }

    for def in &parsed.definitions {
        let key = (def.name.clone(), def.kind);
        match by_identity.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(existing) => {
                tx.definitions().update(existing, def)?;
                sets.modified.push(existing);
                result.definitions_updated += 1;
            }
            None => {
                let id = tx.definitions().insert(file_id, def)?;
                sets.added.push(id);
                result.definitions_added += 1;
            }
        }
    }

    // Whatever is left was removed from the file.
    let leftovers: Vec<DefinitionId> = by_identity.into_values().flatten().collect();
    if !leftovers.is_empty() {
        let snapshot = tx.modules().modules_of(&leftovers)?;
        for def in leftovers {
            delete_definition(tx, def, snapshot.get(&def).copied(), sets)?;
            result.definitions_removed += 1;
        }
    }
    Ok(())
}

/// Phase 5/6 worker: insert a file's references, symbols, and usages,
/// resolving imported names to definition IDs. When `only_sources` is
/// given (dependent rework) references with other specifiers are left
/// alone. Returns the number of references inserted.
fn insert_dependencies<H: StoreHandle>(
    tx: &H,
    resolver: &ImportResolver<'_, H>,
    root: &Path,
    file_id: FileId,
    parsed: &ParsedFile,
    only_sources: Option<&HashSet<String>>,
) -> IndexResult<usize> {
    let deps = tx.dependencies();
    let mut inserted = 0;

    for reference in &parsed.references {
        if let Some(only) = only_sources {
            if !only.contains(&reference.source) {
                continue;
            }
        }

        let target_rel: Option<PathBuf> = reference
            .resolved_path
            .as_deref()
            .and_then(|abs| abs.strip_prefix(root).ok())
            .map(Path::to_path_buf);
        let to_file = match &target_rel {
            Some(rel) => tx.files().get_by_path(rel)?.map(|r| r.id),
            None => None,
        };

        let ref_id = deps.insert_reference(
            file_id,
            to_file,
            reference.kind,
            &reference.source,
            reference.external,
            reference.type_only,
        )?;
        inserted += 1;

        for import in &reference.imports {
            let definition = match &target_rel {
                Some(rel) => resolver.resolve(rel, import)?,
                None => None,
            };
            let symbol = deps.insert_symbol(
                Some(ref_id),
                None,
                definition,
                &import.name,
                &import.local_name,
                import.kind,
            )?;
            for usage in &import.usages {
                deps.insert_usage(symbol, usage.line + 1, usage.column, usage.context)?;
            }
        }
    }

    // Internal usages attach to file-owned symbols, one per used name.
    if only_sources.is_none() && !parsed.internal_usages.is_empty() {
        let defs_by_name: HashMap<String, DefinitionId> = tx
            .definitions()
            .by_file(file_id)?
            .into_iter()
            .map(|d| (d.name, d.id))
            .collect();

        let mut symbols: HashMap<&str, crate::SymbolId> = HashMap::new();
        for usage in &parsed.internal_usages {
            let symbol = match symbols.get(usage.name.as_str()) {
                Some(&s) => s,
                None => {
                    let s = deps.insert_symbol(
                        None,
                        Some(file_id),
                        defs_by_name.get(&usage.name).copied(),
                        &usage.name,
                        &usage.name,
                        ImportKind::Named,
                    )?;
                    symbols.insert(usage.name.as_str(), s);
                    s
                }
            };
            deps.insert_usage(symbol, usage.line + 1, usage.column, usage.context)?;
        }
    }

    Ok(inserted)
}
