//! File system walker for discovering source files.
//!
//! Directory traversal with gitignore support, custom ignore patterns from
//! configuration, and extension filtering.

use crate::config::Settings;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Walks the indexed root to find source files.
pub struct FileWalker<'a> {
    settings: &'a Settings,
}

impl<'a> FileWalker<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Walk `root` and return the source files to consider, as absolute
    /// paths.
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false);

        // Custom ignore patterns layer on top of gitignore rules.
        let mut overrides = ignore::overrides::OverrideBuilder::new(root);
        for pattern in &self.settings.indexing.ignore_patterns {
            if let Err(e) = overrides.add(&format!("!{pattern}")) {
                warn!("invalid ignore pattern '{pattern}': {e}");
            }
        }
        if let Ok(built) = overrides.build() {
            builder.overrides(built);
        }

        let extensions = &self.settings.indexing.extensions;
        let mut files: Vec<PathBuf> = builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| {
                let path = entry.path();
                // Skip dotfiles outright.
                if path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
                {
                    return None;
                }
                let ext = path.extension()?.to_str()?;
                if extensions.iter().any(|e| e == ext) {
                    Some(path.to_path_buf())
                } else {
                    None
                }
            })
            .collect();

        files.sort();
        files
    }

    /// Count files that would be considered (dry runs).
    pub fn count_files(&self, root: &Path) -> usize {
        self.walk(root).len()
    }
}
