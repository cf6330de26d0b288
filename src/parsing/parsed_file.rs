//! The data a parser hands to the sync engine.
//!
//! All positions are 0-based rows/columns as produced by the grammar; the
//! store converts to 1-based lines at insertion time.

use crate::parsing::Language;
use crate::{DefinitionKind, ImportKind, Position, ReferenceKind, UsageContext};
use std::path::PathBuf;

/// Result of parsing one source file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// The source text that was parsed.
    pub content: String,
    /// Byte length of `content`.
    pub size: u64,
    /// Modification time in seconds since the epoch, as given by the caller.
    pub mtime: i64,
    pub language: Language,
    pub definitions: Vec<ParsedDefinition>,
    pub references: Vec<FileReference>,
    /// Usages of the file's own definitions inside the same file.
    pub internal_usages: Vec<InternalUsage>,
}

/// A declared definition.
#[derive(Debug, Clone)]
pub struct ParsedDefinition {
    pub name: String,
    pub kind: DefinitionKind,
    pub exported: bool,
    pub default_export: bool,
    pub start: Position,
    pub end: Position,
    /// Where the declaration header ends (class/interface signature), when
    /// distinguishable from the body end.
    pub declaration_end: Option<Position>,
    /// Single `extends` target of a class.
    pub extends: Option<String>,
    /// `implements` targets of a class.
    pub implements: Vec<String>,
    /// Multi-parent `extends` of an interface.
    pub extends_all: Vec<String>,
}

/// An import-like construct connecting two files.
#[derive(Debug, Clone)]
pub struct FileReference {
    /// Absolute path of the target file, when the specifier resolved to a
    /// known file. `None` for external packages and unresolved specifiers.
    pub resolved_path: Option<PathBuf>,
    pub kind: ReferenceKind,
    /// The literal module specifier as written in source.
    pub source: String,
    pub external: bool,
    pub type_only: bool,
    pub imports: Vec<ParsedImport>,
}

/// One symbol crossing a reference.
#[derive(Debug, Clone)]
pub struct ParsedImport {
    /// Name as exported by the target file.
    pub name: String,
    /// Name bound locally (alias), equal to `name` when not renamed.
    pub local_name: String,
    pub kind: ImportKind,
    /// Where the local binding is used in this file.
    pub usages: Vec<UsageSite>,
}

/// One occurrence of a symbol at a source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSite {
    /// 0-based row.
    pub line: u32,
    pub column: u32,
    pub context: UsageContext,
}

/// A usage of one of the file's own definitions.
#[derive(Debug, Clone)]
pub struct InternalUsage {
    /// Name of the definition being used.
    pub name: String,
    pub line: u32,
    pub column: u32,
    pub context: UsageContext,
}

impl ParsedDefinition {
    /// All inheritance names this definition declares, in scan order.
    pub fn inheritance_names(&self) -> impl Iterator<Item = (&str, crate::RelationshipType)> {
        self.extends
            .as_deref()
            .into_iter()
            .chain(self.extends_all.iter().map(String::as_str))
            .map(|n| (n, crate::RelationshipType::Extends))
            .chain(
                self.implements
                    .iter()
                    .map(|n| (n.as_str(), crate::RelationshipType::Implements)),
            )
    }

    /// The `(name, kind)` identity tuple used for cross-edit matching.
    pub fn identity(&self) -> (&str, DefinitionKind) {
        (&self.name, self.kind)
    }
}
