//! TypeScript parser built on tree-sitter.
//!
//! **Tree-sitter grammar**: tree-sitter-typescript (TS and TSX variants).
//! The TypeScript grammar is a superset of JavaScript, so plain `.js`
//! sources parse with it too; `.tsx`/`.jsx` use the TSX variant.
//!
//! Extraction happens in two passes over one tree: a declaration pass that
//! collects definitions and import/export references, then a usage pass
//! that classifies every occurrence of a watched identifier (imported
//! locals and the file's own top-level names).

use crate::error::{ParseError, ParseResult};
use crate::parsing::workspace::resolve_relative;
use crate::parsing::{
    FileReference, InternalUsage, Language, ParseContext, ParsedDefinition, ParsedFile,
    ParsedImport, SourceParser, UsageSite,
};
use crate::{DefinitionKind, ImportKind, Position, ReferenceKind, UsageContext};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Parser for TypeScript, TSX, and JavaScript sources.
pub struct TypeScriptParser;

impl TypeScriptParser {
    pub fn new() -> Self {
        Self
    }

    fn grammar_for(language: Language) -> tree_sitter::Language {
        if language.uses_tsx_grammar() {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        }
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for TypeScriptParser {
    fn parse_file(
        &self,
        path: &Path,
        content: &str,
        mtime: i64,
        ctx: &ParseContext<'_>,
    ) -> ParseResult<ParsedFile> {
        let language = Language::from_path(path).ok_or_else(|| ParseError::GrammarInit {
            language: "unknown".to_string(),
            reason: format!("unsupported extension on '{}'", path.display()),
        })?;

        // tree_sitter::Parser is !Sync; a fresh instance per parse keeps the
        // trait callable from rayon workers.
        let mut parser = Parser::new();
        parser
            .set_language(&Self::grammar_for(language))
            .map_err(|e| ParseError::GrammarInit {
                language: language.as_str().to_string(),
                reason: e.to_string(),
            })?;

        let tree = parser.parse(content, None).ok_or_else(|| ParseError::NoTree {
            path: path.to_path_buf(),
        })?;

        let mut extractor = Extractor {
            source: content,
            path,
            ctx,
            definitions: Vec::new(),
            references: Vec::new(),
            named_exports: Vec::new(),
            default_export_name: None,
        };
        extractor.collect_program(tree.root_node());
        extractor.apply_export_marks();

        let usage_pass = UsagePass::new(&extractor.definitions, &extractor.references);
        let (references, internal_usages) =
            usage_pass.run(tree.root_node(), content, extractor.references);

        Ok(ParsedFile {
            content: content.to_string(),
            size: content.len() as u64,
            mtime,
            language,
            definitions: extractor.definitions,
            references,
            internal_usages,
        })
    }
}

struct Extractor<'a> {
    source: &'a str,
    path: &'a Path,
    ctx: &'a ParseContext<'a>,
    definitions: Vec<ParsedDefinition>,
    references: Vec<FileReference>,
    /// Names exported via a local `export { a, b }` clause.
    named_exports: Vec<String>,
    /// Name exported via `export default <identifier>;`.
    default_export_name: Option<String>,
}

impl<'a> Extractor<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn pos(point: tree_sitter::Point) -> Position {
        Position::new(point.row as u32, point.column as u32)
    }

    fn collect_program(&mut self, root: Node<'_>) {
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            self.collect_statement(child, false, false);
        }
    }

    fn collect_statement(&mut self, node: Node<'_>, exported: bool, default_export: bool) {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                self.collect_function(node, exported, default_export);
            }
            "class_declaration" | "abstract_class_declaration" => {
                self.collect_class(node, exported, default_export);
            }
            "interface_declaration" => {
                self.collect_interface(node, exported);
            }
            "type_alias_declaration" => {
                self.collect_named(node, DefinitionKind::TypeAlias, exported, false);
            }
            "enum_declaration" => {
                self.collect_named(node, DefinitionKind::Enum, exported, false);
            }
            "lexical_declaration" | "variable_declaration" => {
                self.collect_variables(node, exported);
            }
            "import_statement" => {
                self.collect_import(node);
            }
            "export_statement" => {
                self.collect_export(node);
            }
            _ => {}
        }
    }

    fn collect_function(&mut self, node: Node<'_>, exported: bool, default_export: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        self.definitions.push(ParsedDefinition {
            name: self.text(name_node).to_string(),
            kind: DefinitionKind::Function,
            exported,
            default_export,
            start: Self::pos(node.start_position()),
            end: Self::pos(node.end_position()),
            declaration_end: node
                .child_by_field_name("body")
                .map(|b| Self::pos(b.start_position())),
            extends: None,
            implements: Vec::new(),
            extends_all: Vec::new(),
        });
    }

    fn collect_class(&mut self, node: Node<'_>, exported: bool, default_export: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let mut extends = None;
        let mut implements = Vec::new();

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "class_heritage" {
                let mut heritage_cursor = child.walk();
                for clause in child.named_children(&mut heritage_cursor) {
                    match clause.kind() {
                        "extends_clause" => {
                            let mut c = clause.walk();
                            if let Some(target) = clause
                                .named_children(&mut c)
                                .find(|n| n.kind() != "type_arguments")
                            {
                                extends = Some(base_name(self.text(target)));
                            }
                        }
                        "implements_clause" => {
                            let mut c = clause.walk();
                            for target in clause.named_children(&mut c) {
                                if target.kind() != "type_arguments" {
                                    implements.push(base_name(self.text(target)));
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        let body = node.child_by_field_name("body");
        self.definitions.push(ParsedDefinition {
            name: self.text(name_node).to_string(),
            kind: DefinitionKind::Class,
            exported,
            default_export,
            start: Self::pos(node.start_position()),
            end: Self::pos(node.end_position()),
            declaration_end: body.map(|b| Self::pos(b.start_position())),
            extends,
            implements,
            extends_all: Vec::new(),
        });

        if let Some(body) = body {
            self.collect_methods(body);
        }
    }

    fn collect_methods(&mut self, body: Node<'_>) {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if member.kind() != "method_definition" {
                continue;
            }
            let Some(name_node) = member.child_by_field_name("name") else {
                continue;
            };
            let name = self.text(name_node).to_string();
            if name == "constructor" {
                continue;
            }
            self.definitions.push(ParsedDefinition {
                name,
                kind: DefinitionKind::Method,
                exported: false,
                default_export: false,
                start: Self::pos(member.start_position()),
                end: Self::pos(member.end_position()),
                declaration_end: member
                    .child_by_field_name("body")
                    .map(|b| Self::pos(b.start_position())),
                extends: None,
                implements: Vec::new(),
                extends_all: Vec::new(),
            });
        }
    }

    fn collect_interface(&mut self, node: Node<'_>, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let mut extends_all = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "extends_type_clause" {
                let mut c = child.walk();
                for target in child.named_children(&mut c) {
                    if target.kind() != "type_arguments" {
                        extends_all.push(base_name(self.text(target)));
                    }
                }
            }
        }

        self.definitions.push(ParsedDefinition {
            name: self.text(name_node).to_string(),
            kind: DefinitionKind::Interface,
            exported,
            default_export: false,
            start: Self::pos(node.start_position()),
            end: Self::pos(node.end_position()),
            declaration_end: node
                .child_by_field_name("body")
                .map(|b| Self::pos(b.start_position())),
            extends: None,
            implements: Vec::new(),
            extends_all,
        });
    }

    fn collect_named(
        &mut self,
        node: Node<'_>,
        kind: DefinitionKind,
        exported: bool,
        default_export: bool,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        self.definitions.push(ParsedDefinition {
            name: self.text(name_node).to_string(),
            kind,
            exported,
            default_export,
            start: Self::pos(node.start_position()),
            end: Self::pos(node.end_position()),
            declaration_end: None,
            extends: None,
            implements: Vec::new(),
            extends_all: Vec::new(),
        });
    }

    fn collect_variables(&mut self, node: Node<'_>, exported: bool) {
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            // Destructuring patterns do not produce a single definition.
            if name_node.kind() != "identifier" {
                continue;
            }
            self.definitions.push(ParsedDefinition {
                name: self.text(name_node).to_string(),
                kind: DefinitionKind::Variable,
                exported,
                default_export: false,
                start: Self::pos(node.start_position()),
                end: Self::pos(node.end_position()),
                declaration_end: None,
                extends: None,
                implements: Vec::new(),
                extends_all: Vec::new(),
            });
        }
    }

    fn collect_import(&mut self, node: Node<'_>) {
        let Some(source_node) = node.child_by_field_name("source") else {
            return;
        };
        let source = unquote(self.text(source_node));
        let type_only = has_type_keyword(node);

        let mut imports = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "import_clause" {
                continue;
            }
            let mut clause_cursor = child.walk();
            for part in child.named_children(&mut clause_cursor) {
                match part.kind() {
                    "identifier" => imports.push(ParsedImport {
                        name: "default".to_string(),
                        local_name: self.text(part).to_string(),
                        kind: ImportKind::Default,
                        usages: Vec::new(),
                    }),
                    "namespace_import" => {
                        let mut ns_cursor = part.walk();
                        if let Some(ident) = part
                            .named_children(&mut ns_cursor)
                            .find(|n| n.kind() == "identifier")
                        {
                            imports.push(ParsedImport {
                                name: "*".to_string(),
                                local_name: self.text(ident).to_string(),
                                kind: ImportKind::Namespace,
                                usages: Vec::new(),
                            });
                        }
                    }
                    "named_imports" => {
                        let mut named_cursor = part.walk();
                        for spec in part.named_children(&mut named_cursor) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            let Some(name_node) = spec.child_by_field_name("name") else {
                                continue;
                            };
                            let name = self.text(name_node).to_string();
                            let local = spec
                                .child_by_field_name("alias")
                                .map(|a| self.text(a).to_string())
                                .unwrap_or_else(|| name.clone());
                            let kind = if name == "default" {
                                ImportKind::Default
                            } else {
                                ImportKind::Named
                            };
                            imports.push(ParsedImport {
                                name,
                                local_name: local,
                                kind,
                                usages: Vec::new(),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        self.push_reference(ReferenceKind::Import, &source, type_only, imports);
    }

    fn collect_export(&mut self, node: Node<'_>) {
        if let Some(source_node) = node.child_by_field_name("source") {
            // `export ... from` is a reference, not a declaration.
            let source = unquote(self.text(source_node));
            let type_only = has_type_keyword(node);
            let mut clause = None;
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "export_clause" {
                    clause = Some(child);
                }
            }

            match clause {
                Some(clause) => {
                    let mut imports = Vec::new();
                    let mut spec_cursor = clause.walk();
                    for spec in clause.named_children(&mut spec_cursor) {
                        if spec.kind() != "export_specifier" {
                            continue;
                        }
                        let Some(name_node) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let name = self.text(name_node).to_string();
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|a| self.text(a).to_string())
                            .unwrap_or_else(|| name.clone());
                        let kind = if name == "default" {
                            ImportKind::Default
                        } else {
                            ImportKind::Named
                        };
                        imports.push(ParsedImport {
                            name,
                            local_name: local,
                            kind,
                            usages: Vec::new(),
                        });
                    }
                    self.push_reference(ReferenceKind::ReExport, &source, type_only, imports);
                }
                // `export * from` (optionally `* as ns`).
                None => self.push_reference(ReferenceKind::ExportAll, &source, type_only, vec![]),
            }
            return;
        }

        if let Some(declaration) = node.child_by_field_name("declaration") {
            let default = has_default_keyword(node);
            self.collect_statement(declaration, true, default);
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            // `export default <identifier>;`
            if value.kind() == "identifier" {
                self.default_export_name = Some(self.text(value).to_string());
            }
            return;
        }

        // Local `export { a, b }` clause: mark in a post-pass.
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "export_clause" {
                continue;
            }
            let mut spec_cursor = child.walk();
            for spec in child.named_children(&mut spec_cursor) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                if let Some(name_node) = spec.child_by_field_name("name") {
                    self.named_exports.push(self.text(name_node).to_string());
                }
            }
        }
    }

    fn push_reference(
        &mut self,
        kind: ReferenceKind,
        source: &str,
        type_only: bool,
        imports: Vec<ParsedImport>,
    ) {
        let (resolved_path, external) = if source.starts_with('.') {
            (
                resolve_relative(self.path, source, self.ctx.known_files),
                false,
            )
        } else {
            match self.ctx.workspace.resolve(source, self.ctx.known_files) {
                Some(path) => (Some(path), false),
                None => (None, true),
            }
        };

        self.references.push(FileReference {
            resolved_path,
            kind,
            source: source.to_string(),
            external,
            type_only,
            imports,
        });
    }

    /// Apply `export { a }` / `export default a` marks collected after the
    /// definitions themselves.
    fn apply_export_marks(&mut self) {
        for def in &mut self.definitions {
            if self.named_exports.iter().any(|n| n == &def.name) {
                def.exported = true;
            }
            if self.default_export_name.as_deref() == Some(def.name.as_str()) {
                def.exported = true;
                def.default_export = true;
            }
        }
    }
}

/// Second pass: classify occurrences of watched identifiers.
struct UsagePass {
    /// local name -> index into the reference/import table.
    import_slots: HashMap<String, (usize, usize)>,
    /// own top-level definition names.
    own_names: HashMap<String, ()>,
}

impl UsagePass {
    fn new(definitions: &[ParsedDefinition], references: &[FileReference]) -> Self {
        let mut import_slots = HashMap::new();
        for (ref_idx, reference) in references.iter().enumerate() {
            for (import_idx, import) in reference.imports.iter().enumerate() {
                import_slots.insert(import.local_name.clone(), (ref_idx, import_idx));
            }
        }
        let own_names = definitions
            .iter()
            .filter(|d| d.kind != DefinitionKind::Method)
            .map(|d| (d.name.clone(), ()))
            .collect();
        Self {
            import_slots,
            own_names,
        }
    }

    fn run(
        self,
        root: Node<'_>,
        source: &str,
        mut references: Vec<FileReference>,
    ) -> (Vec<FileReference>, Vec<InternalUsage>) {
        let mut internal = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let kind = node.kind();
            if kind == "identifier" || kind == "type_identifier" {
                if let Some(context) = classify_usage(node) {
                    let text = node.utf8_text(source.as_bytes()).unwrap_or("");
                    let point = node.start_position();
                    let site = UsageSite {
                        line: point.row as u32,
                        column: point.column as u32,
                        context,
                    };
                    if let Some(&(ref_idx, import_idx)) = self.import_slots.get(text) {
                        references[ref_idx].imports[import_idx].usages.push(site);
                    } else if self.own_names.contains_key(text) {
                        internal.push(InternalUsage {
                            name: text.to_string(),
                            line: site.line,
                            column: site.column,
                            context,
                        });
                    }
                }
            }
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                stack.push(child);
            }
        }
        (references, internal)
    }
}

/// Classify an identifier occurrence, or `None` when it is part of a
/// declaration or import/export clause rather than a usage.
fn classify_usage(node: Node<'_>) -> Option<UsageContext> {
    let parent = node.parent()?;
    let parent_kind = parent.kind();

    // Declaration names and import/export machinery are not usages.
    match parent_kind {
        "function_declaration"
        | "generator_function_declaration"
        | "class_declaration"
        | "abstract_class_declaration"
        | "interface_declaration"
        | "type_alias_declaration"
        | "enum_declaration"
        | "variable_declarator"
        | "method_definition" => {
            if field_is(parent, "name", node) {
                return None;
            }
        }
        "import_specifier" | "export_specifier" | "namespace_import" | "import_clause" => {
            return None;
        }
        _ => {}
    }

    if parent_kind == "call_expression" && field_is(parent, "function", node) {
        return Some(UsageContext::Call);
    }
    if parent_kind == "new_expression" && field_is(parent, "constructor", node) {
        return Some(UsageContext::New);
    }
    if parent_kind == "member_expression" && field_is(parent, "object", node) {
        // `svc.method(...)`: a member access that is immediately invoked
        // counts as a call on the object.
        if let Some(grandparent) = parent.parent() {
            if grandparent.kind() == "call_expression" && field_is(grandparent, "function", parent)
            {
                return Some(UsageContext::Call);
            }
        }
        return Some(UsageContext::Member);
    }
    if parent_kind == "decorator" {
        return Some(UsageContext::Decorator);
    }
    if node.kind() == "type_identifier"
        || matches!(
            parent_kind,
            "type_annotation"
                | "generic_type"
                | "type_arguments"
                | "extends_clause"
                | "implements_clause"
                | "extends_type_clause"
        )
    {
        return Some(UsageContext::Type);
    }

    Some(UsageContext::Reference)
}

fn field_is(parent: Node<'_>, field: &str, node: Node<'_>) -> bool {
    parent
        .child_by_field_name(field)
        .is_some_and(|n| n.id() == node.id())
}

/// `Base<T>` -> `Base`; `ns.Base` stays as written minus type arguments.
fn base_name(text: &str) -> String {
    text.split('<').next().unwrap_or(text).trim().to_string()
}

fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

/// `import type ...` / `export type ...` carry a bare `type` keyword token.
fn has_type_keyword(node: Node<'_>) -> bool {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == "type" && !child.is_named() {
                return true;
            }
        }
    }
    false
}

fn has_default_keyword(node: Node<'_>) -> bool {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == "default" {
                return true;
            }
        }
    }
    false
}
