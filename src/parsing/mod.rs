//! Parser contract and the bundled TypeScript implementation.
//!
//! The sync engine depends only on the [`SourceParser`] trait and the
//! [`ParsedFile`] data it returns; the tree-sitter TypeScript parser is one
//! implementation of that contract. Tests substitute scripted parsers.

mod language;
mod parsed_file;
pub mod typescript;
mod workspace;

pub use language::Language;
pub use parsed_file::{
    FileReference, InternalUsage, ParsedDefinition, ParsedFile, ParsedImport, UsageSite,
};
pub use typescript::TypeScriptParser;
pub use workspace::{resolve_relative, WorkspaceMap};

use crate::error::ParseResult;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Everything a parser needs beyond the file itself: the set of files known
/// to exist (for import resolution probing) and the workspace alias map.
pub struct ParseContext<'a> {
    pub known_files: &'a HashSet<PathBuf>,
    pub workspace: &'a WorkspaceMap,
}

/// Turns source text into a [`ParsedFile`].
///
/// Implementations must be callable from multiple threads; the sync engine
/// parses the changed set in parallel before its store transaction opens.
pub trait SourceParser: Send + Sync {
    /// Parse one file. `mtime` is seconds since the epoch as observed by
    /// the caller; it is carried through into the result untouched.
    fn parse_file(
        &self,
        path: &Path,
        content: &str,
        mtime: i64,
        ctx: &ParseContext<'_>,
    ) -> ParseResult<ParsedFile>;

    /// Whether this parser understands the file at all. Files that fail
    /// this check are not counted as parse failures.
    fn supports(&self, path: &Path) -> bool {
        Language::from_path(path).is_some()
    }
}
