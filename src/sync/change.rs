//! Content-hash change detection.
//!
//! Walks the tree, hashes every candidate file, and compares against the
//! store's previous state. Files present in the store but not seen on
//! disk are deleted. One hash function is used everywhere; a file's hash
//! is its identity across syncs.

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::parsing::Language;
use crate::storage::{IndexStore, StoreHandle};
use crate::sync::FileWalker;
use crate::FileId;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// One detected difference between disk and store.
#[derive(Debug, Clone)]
pub enum FileChange {
    Added {
        /// Relative to the indexed root.
        path: PathBuf,
        language: Language,
        content: String,
        hash: String,
        size: u64,
        mtime: i64,
    },
    Modified {
        file_id: FileId,
        path: PathBuf,
        language: Language,
        content: String,
        hash: String,
        size: u64,
        mtime: i64,
    },
    Deleted { file_id: FileId, path: PathBuf },
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            Self::Added { path, .. } | Self::Modified { path, .. } | Self::Deleted { path, .. } => {
                path
            }
        }
    }
}

/// Everything the sync engine needs to know about the current tree.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub changes: Vec<FileChange>,
    /// Absolute paths of every source file currently on disk, for the
    /// parser's import probing.
    pub on_disk: HashSet<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Stable content hash used everywhere change detection happens.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct ChangeDetector<'a> {
    settings: &'a Settings,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Compare the tree under `root` against the store.
    pub fn detect(&self, root: &Path, store: &IndexStore) -> IndexResult<ChangeSet> {
        let walker = FileWalker::new(self.settings);
        let on_disk_paths = walker.walk(root);

        let mut previous = store.files().hash_map()?;
        let mut changes = Vec::new();
        let mut on_disk = HashSet::with_capacity(on_disk_paths.len());

        for abs_path in on_disk_paths {
            let rel_path = match abs_path.strip_prefix(root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => {
                    return Err(IndexError::OutsideRoot {
                        path: abs_path,
                        root: root.to_path_buf(),
                    });
                }
            };
            let Some(language) = Language::from_path(&abs_path) else {
                continue;
            };

            let content = match std::fs::read_to_string(&abs_path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("skipping unreadable file '{}': {e}", abs_path.display());
                    continue;
                }
            };
            on_disk.insert(abs_path.clone());

            let hash = content_hash(&content);
            let size = content.len() as u64;
            let mtime = file_mtime(&abs_path);

            match previous.remove(&rel_path) {
                None => changes.push(FileChange::Added {
                    path: rel_path,
                    language,
                    content,
                    hash,
                    size,
                    mtime,
                }),
                Some((file_id, stored_hash)) => {
                    if stored_hash != hash {
                        changes.push(FileChange::Modified {
                            file_id,
                            path: rel_path,
                            language,
                            content,
                            hash,
                            size,
                            mtime,
                        });
                    }
                }
            }
        }

        // Anything the walk did not visit is gone.
        for (path, (file_id, _)) in previous {
            changes.push(FileChange::Deleted { file_id, path });
        }

        debug!(
            added = changes.iter().filter(|c| matches!(c, FileChange::Added { .. })).count(),
            modified = changes.iter().filter(|c| matches!(c, FileChange::Modified { .. })).count(),
            deleted = changes.iter().filter(|c| matches!(c, FileChange::Deleted { .. })).count(),
            "change detection complete"
        );

        Ok(ChangeSet { changes, on_disk })
    }
}

fn file_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
