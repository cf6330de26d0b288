//! Core identifier and kind types shared across the index.
//!
//! Every entity is keyed by a dense integer ID allocated by the store.
//! Relationships between entities are always ID edges; string identity is
//! never used as a foreign key.

use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Defines a dense ID newtype backed by `NonZeroU32`.
///
/// IDs are SQLite rowids on the wire, so each type also implements
/// `ToSql`/`FromSql` and can be bound in queries directly.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(NonZeroU32);

        impl $name {
            pub fn new(value: u32) -> Option<Self> {
                NonZeroU32::new(value).map(Self)
            }

            pub fn value(&self) -> u32 {
                self.0.get()
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(i64::from(self.0.get())))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = i64::column_result(value)?;
                u32::try_from(raw)
                    .ok()
                    .and_then(Self::new)
                    .ok_or(FromSqlError::OutOfRange(raw))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.get())
            }
        }
    };
}

define_id!(
    /// A tracked source file.
    FileId
);
define_id!(
    /// A declared definition (function, class, interface, ...).
    DefinitionId
);
define_id!(
    /// An import-like construct connecting two files.
    ReferenceId
);
define_id!(
    /// A named thing crossing a reference or used inside a file.
    SymbolId
);
define_id!(
    /// One concrete occurrence of a symbol.
    UsageId
);
define_id!(
    /// A node in the module tree.
    ModuleId
);
define_id!(
    /// An ordered module-to-module edge.
    InteractionId
);
define_id!(
    /// An ordered trace of interactions.
    FlowId
);
define_id!(
    /// A named group of flows.
    FeatureId
);
define_id!(
    /// A definition-to-definition annotation row.
    RelationshipId
);

/// Defines a closed string-valued enum with stable wire forms plus
/// `ToSql`/`FromSql`, mirroring how kinds are stored as TEXT columns.
macro_rules! define_kind {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(text: &str) -> Option<Self> {
                match text {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                Self::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {}: {text}", stringify!($name)).into())
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_kind!(
    /// Kind of a declared definition.
    DefinitionKind {
        Function => "function",
        Class => "class",
        Interface => "interface",
        TypeAlias => "type",
        Variable => "variable",
        Method => "method",
        Enum => "enum",
    }
);

define_kind!(
    /// Kind of a file-to-file reference.
    ReferenceKind {
        Import => "import",
        ReExport => "re-export",
        ExportAll => "export-all",
    }
);

define_kind!(
    /// How a symbol crosses a reference.
    ImportKind {
        Named => "named",
        Default => "default",
        Namespace => "namespace",
    }
);

define_kind!(
    /// Syntactic context of a usage site.
    UsageContext {
        Call => "call",
        New => "new",
        Member => "member",
        Type => "type",
        Decorator => "decorator",
        Reference => "reference",
    }
);

define_kind!(
    /// Relationship annotation type between two definitions.
    RelationshipType {
        Uses => "uses",
        Extends => "extends",
        Implements => "implements",
    }
);

define_kind!(
    /// Provenance of an interaction row.
    InteractionSource {
        Ast => "ast",
        LlmInferred => "llm-inferred",
        ContractMatched => "contract-matched",
    }
);

define_kind!(
    /// Directionality of an interaction.
    InteractionDirection {
        Uni => "uni",
        Bi => "bi",
    }
);

define_kind!(
    /// Coarse classification set by the enrichment pipeline.
    InteractionPattern {
        Business => "business",
        Utility => "utility",
        TestInternal => "test-internal",
    }
);

define_kind!(
    /// Stakeholder-visible action a flow performs.
    ActionType {
        Create => "create",
        Update => "update",
        Delete => "delete",
        View => "view",
    }
);

define_kind!(
    /// Enrichment stratum tracked in the sync_dirty table.
    DirtyLayer {
        Metadata => "metadata",
        Relationships => "relationships",
        Modules => "modules",
        Contracts => "contracts",
        Interactions => "interactions",
        Flows => "flows",
        Features => "features",
    }
);

define_kind!(
    /// Why an entity landed in the sync_dirty table.
    DirtyReason {
        Added => "added",
        Modified => "modified",
        Removed => "removed",
        ParentDirty => "parent_dirty",
    }
);

impl UsageContext {
    /// Contexts that contribute edges to the call graph.
    pub fn is_invocation(&self) -> bool {
        matches!(self, Self::Call | Self::New)
    }
}

impl RelationshipType {
    /// Upsert precedence: `extends`/`implements` beat `uses`. Reversing
    /// this ordering is a bug (see DESIGN.md).
    pub fn strength(&self) -> u8 {
        match self {
            Self::Uses => 0,
            Self::Extends | Self::Implements => 1,
        }
    }
}

impl ActionType {
    /// Mutations honor the entry member's trace-from hint; views start at
    /// the member itself.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

/// A 0-based source position as reported by the parser.
///
/// The store records 1-based lines; conversion happens at insertion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub row: u32,
    pub column: u32,
}

impl Position {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// 1-based line number for storage.
    pub fn line(&self) -> u32 {
        self.row + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_rejects_zero() {
        assert!(FileId::new(0).is_none());
        assert!(DefinitionId::new(0).is_none());

        let id = DefinitionId::new(42).unwrap();
        assert_eq!(id.value(), 42);
    }

    #[test]
    fn test_id_ordering_and_hash() {
        use std::collections::HashSet;

        let a = ModuleId::new(1).unwrap();
        let b = ModuleId::new(2).unwrap();
        assert!(a < b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&ModuleId::new(1).unwrap()));
        assert!(!set.contains(&b));
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            DefinitionKind::Function,
            DefinitionKind::Class,
            DefinitionKind::Interface,
            DefinitionKind::TypeAlias,
            DefinitionKind::Variable,
            DefinitionKind::Method,
            DefinitionKind::Enum,
        ] {
            assert_eq!(DefinitionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DefinitionKind::parse("struct"), None);
    }

    #[test]
    fn test_reference_kind_wire_form() {
        assert_eq!(ReferenceKind::ReExport.as_str(), "re-export");
        assert_eq!(
            ReferenceKind::parse("export-all"),
            Some(ReferenceKind::ExportAll)
        );
    }

    #[test]
    fn test_relationship_strength_policy() {
        assert!(RelationshipType::Extends.strength() > RelationshipType::Uses.strength());
        assert!(RelationshipType::Implements.strength() > RelationshipType::Uses.strength());
        assert_eq!(
            RelationshipType::Extends.strength(),
            RelationshipType::Implements.strength()
        );
    }

    #[test]
    fn test_action_type_mutation() {
        assert!(ActionType::Create.is_mutation());
        assert!(ActionType::Delete.is_mutation());
        assert!(!ActionType::View.is_mutation());
    }

    #[test]
    fn test_position_line_conversion() {
        let pos = Position::new(0, 4);
        assert_eq!(pos.line(), 1);
    }
}
