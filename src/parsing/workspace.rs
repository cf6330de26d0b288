//! Workspace alias resolution for non-relative imports.
//!
//! Given a workspace root and the alias table from settings (e.g.
//! `"@app/" -> "src/app"`), maps import specifiers to filesystem paths.
//! Matching is longest-prefix; candidates are probed against the known-file
//! set with the usual extension and index-file fallbacks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Extensions probed, in order, when a specifier omits one.
const PROBE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// Maps workspace alias prefixes to absolute directories.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceMap {
    /// Sorted by prefix length, longest first.
    aliases: Vec<(String, PathBuf)>,
}

impl WorkspaceMap {
    /// Build from the settings alias table, anchoring relative directories
    /// at `root`.
    pub fn new(root: &Path, aliases: &std::collections::HashMap<String, PathBuf>) -> Self {
        let mut entries: Vec<(String, PathBuf)> = aliases
            .iter()
            .map(|(prefix, dir)| {
                let abs = if dir.is_absolute() {
                    dir.clone()
                } else {
                    root.join(dir)
                };
                (prefix.clone(), abs)
            })
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { aliases: entries }
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Resolve a non-relative specifier through the alias table.
    /// Returns `None` when no alias matches or no known file exists at the
    /// probed locations; such specifiers are external.
    pub fn resolve(&self, specifier: &str, known_files: &HashSet<PathBuf>) -> Option<PathBuf> {
        for (prefix, dir) in &self.aliases {
            if let Some(rest) = specifier.strip_prefix(prefix.as_str()) {
                let base = dir.join(rest.trim_start_matches('/'));
                if let Some(found) = probe(&base, known_files) {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Resolve a relative specifier (`./x`, `../y`) against the importing file.
pub fn resolve_relative(
    importing_file: &Path,
    specifier: &str,
    known_files: &HashSet<PathBuf>,
) -> Option<PathBuf> {
    let dir = importing_file.parent()?;
    let joined = normalize(&dir.join(specifier));
    probe(&joined, known_files)
}

/// Probe a candidate path: as written, with each extension appended, then
/// as a directory with an index file.
fn probe(base: &Path, known_files: &HashSet<PathBuf>) -> Option<PathBuf> {
    if known_files.contains(base) {
        return Some(base.to_path_buf());
    }
    for ext in PROBE_EXTENSIONS {
        let with_ext = base.with_extension(ext);
        if known_files.contains(&with_ext) {
            return Some(with_ext);
        }
    }
    for ext in PROBE_EXTENSIONS {
        let index = base.join(format!("index.{ext}"));
        if known_files.contains(&index) {
            return Some(index);
        }
    }
    None
}

/// Collapse `.` and `..` segments without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
