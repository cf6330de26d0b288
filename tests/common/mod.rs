//! Shared fixtures for the integration suites.
//!
//! `StubParser` implements the parser contract over a line-oriented
//! directive notation, so pipeline tests control definitions, imports,
//! and usages exactly while the engine still reads real files, hashes
//! real bytes, and resolves real paths. One directive per line:
//!
//! ```text
//! def <kind> <name> <start_row> <end_row> [exported] [default]
//!     [extends=Name] [implements=A,B] [extendsall=A,B]
//! import <name>[:<local>] <specifier>
//! import-default <local> <specifier>
//! reexport <name>[:<local>] <specifier>
//! exportall <specifier>
//! usage <local> <row> <context>        # attaches to the import binding
//! internal <name> <row> <context>      # usage of the file's own def
//! fail                                 # this file refuses to parse
//! ```
//!
//! Rows are 0-based, matching the contract.

use codatlas::error::{ParseError, ParseResult};
use codatlas::parsing::{
    resolve_relative, FileReference, InternalUsage, Language, ParseContext, ParsedDefinition,
    ParsedFile, ParsedImport, SourceParser, UsageSite,
};
use codatlas::{DefinitionKind, ImportKind, Position, ReferenceKind, UsageContext};
use std::path::Path;

pub struct StubParser;

impl SourceParser for StubParser {
    fn parse_file(
        &self,
        path: &Path,
        content: &str,
        mtime: i64,
        ctx: &ParseContext<'_>,
    ) -> ParseResult<ParsedFile> {
        let mut definitions = Vec::new();
        let mut references: Vec<FileReference> = Vec::new();
        let mut internal_usages = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            let directive = words.next().unwrap();
            let rest: Vec<&str> = words.collect();

            match directive {
                "fail" => {
                    return Err(ParseError::NoTree {
                        path: path.to_path_buf(),
                    });
                }
                "def" => definitions.push(parse_def(&rest)),
                "import" | "reexport" => {
                    let (name, local) = split_alias(rest[0]);
                    let kind = if directive == "import" {
                        ReferenceKind::Import
                    } else {
                        ReferenceKind::ReExport
                    };
                    let import_kind = if name == "default" {
                        ImportKind::Default
                    } else {
                        ImportKind::Named
                    };
                    push_reference(
                        &mut references,
                        path,
                        ctx,
                        kind,
                        rest[1],
                        ParsedImport {
                            name: name.to_string(),
                            local_name: local.to_string(),
                            kind: import_kind,
                            usages: Vec::new(),
                        },
                    );
                }
                "import-default" => {
                    push_reference(
                        &mut references,
                        path,
                        ctx,
                        ReferenceKind::Import,
                        rest[1],
                        ParsedImport {
                            name: "default".to_string(),
                            local_name: rest[0].to_string(),
                            kind: ImportKind::Default,
                            usages: Vec::new(),
                        },
                    );
                }
                "exportall" => {
                    let resolved = resolve_spec(path, rest[0], ctx);
                    references.push(FileReference {
                        resolved_path: resolved.clone(),
                        kind: ReferenceKind::ExportAll,
                        source: rest[0].to_string(),
                        external: resolved.is_none() && !rest[0].starts_with('.'),
                        type_only: false,
                        imports: Vec::new(),
                    });
                }
                "usage" => {
                    let local = rest[0];
                    let row: u32 = rest[1].parse().unwrap();
                    let context = parse_context(rest[2]);
                    let import = references
                        .iter_mut()
                        .flat_map(|r| r.imports.iter_mut())
                        .find(|i| i.local_name == local)
                        .unwrap_or_else(|| panic!("usage before import of '{local}'"));
                    import.usages.push(UsageSite {
                        line: row,
                        column: 0,
                        context,
                    });
                }
                "internal" => {
                    internal_usages.push(InternalUsage {
                        name: rest[0].to_string(),
                        line: rest[1].parse().unwrap(),
                        column: 0,
                        context: parse_context(rest[2]),
                    });
                }
                other => panic!("unknown stub directive '{other}'"),
            }
        }

        Ok(ParsedFile {
            content: content.to_string(),
            size: content.len() as u64,
            mtime,
            language: Language::from_path(path).unwrap_or(Language::TypeScript),
            definitions,
            references,
            internal_usages,
        })
    }
}

fn parse_def(rest: &[&str]) -> ParsedDefinition {
    let kind = match rest[0] {
        "function" => DefinitionKind::Function,
        "class" => DefinitionKind::Class,
        "interface" => DefinitionKind::Interface,
        "type" => DefinitionKind::TypeAlias,
        "variable" => DefinitionKind::Variable,
        "method" => DefinitionKind::Method,
        "enum" => DefinitionKind::Enum,
        other => panic!("unknown def kind '{other}'"),
    };
    let name = rest[1].to_string();
    let start: u32 = rest[2].parse().unwrap();
    let end: u32 = rest[3].parse().unwrap();

    let mut def = ParsedDefinition {
        name,
        kind,
        exported: false,
        default_export: false,
        start: Position::new(start, 0),
        end: Position::new(end, 0),
        declaration_end: None,
        extends: None,
        implements: Vec::new(),
        extends_all: Vec::new(),
    };
    for flag in &rest[4..] {
        if *flag == "exported" {
            def.exported = true;
        } else if *flag == "default" {
            def.default_export = true;
            def.exported = true;
        } else if let Some(name) = flag.strip_prefix("extends=") {
            def.extends = Some(name.to_string());
        } else if let Some(names) = flag.strip_prefix("implements=") {
            def.implements = names.split(',').map(str::to_string).collect();
        } else if let Some(names) = flag.strip_prefix("extendsall=") {
            def.extends_all = names.split(',').map(str::to_string).collect();
        } else {
            panic!("unknown def flag '{flag}'");
        }
    }
    def
}

fn push_reference(
    references: &mut Vec<FileReference>,
    path: &Path,
    ctx: &ParseContext<'_>,
    kind: ReferenceKind,
    specifier: &str,
    import: ParsedImport,
) {
    // One reference per (kind, specifier), like a real parser emits.
    if let Some(existing) = references
        .iter_mut()
        .find(|r| r.kind == kind && r.source == specifier)
    {
        existing.imports.push(import);
        return;
    }
    let resolved = resolve_spec(path, specifier, ctx);
    references.push(FileReference {
        resolved_path: resolved.clone(),
        kind,
        source: specifier.to_string(),
        external: resolved.is_none() && !specifier.starts_with('.'),
        type_only: false,
        imports: vec![import],
    });
}

fn resolve_spec(
    path: &Path,
    specifier: &str,
    ctx: &ParseContext<'_>,
) -> Option<std::path::PathBuf> {
    if specifier.starts_with('.') {
        resolve_relative(path, specifier, ctx.known_files)
    } else {
        ctx.workspace.resolve(specifier, ctx.known_files)
    }
}

fn split_alias(word: &str) -> (&str, &str) {
    match word.split_once(':') {
        Some((name, local)) => (name, local),
        None => (word, word),
    }
}

fn parse_context(word: &str) -> UsageContext {
    UsageContext::parse(word).unwrap_or_else(|| panic!("unknown usage context '{word}'"))
}
