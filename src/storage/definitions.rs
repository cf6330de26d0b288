//! Definition repository.
//!
//! Identity rule: a definition keeps its ID across edits iff `(name, kind)`
//! match within the same file. The repository exposes `update` for exactly
//! the fields that change under that rule (positions, exported flags,
//! inheritance names); everything else is immutable after insert.

use crate::error::{StoreError, StoreResult};
use crate::parsing::ParsedDefinition;
use crate::{DefinitionId, DefinitionKind, FileId};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::HashMap;

/// A stored definition. Lines are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionRecord {
    pub id: DefinitionId,
    pub file_id: FileId,
    pub name: String,
    pub kind: DefinitionKind,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub declaration_end_line: Option<u32>,
    pub declaration_end_column: Option<u32>,
    pub exported: bool,
    pub default_export: bool,
    pub extends_name: Option<String>,
    pub implements_names: Vec<String>,
    pub extends_all_names: Vec<String>,
}

impl DefinitionRecord {
    /// Whether `line` (1-based) falls inside this definition's body.
    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

pub struct DefinitionRepo<'c> {
    conn: &'c Connection,
}

const COLUMNS: &str = "id, file_id, name, kind, start_line, start_column, end_line, end_column, \
     declaration_end_line, declaration_end_column, exported, default_export, \
     extends_name, implements_names, extends_all_names";

impl<'c> DefinitionRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<DefinitionRecord> {
        let implements: Option<String> = row.get(13)?;
        let extends_all: Option<String> = row.get(14)?;
        Ok(DefinitionRecord {
            id: row.get(0)?,
            file_id: row.get(1)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            start_line: row.get(4)?,
            start_column: row.get(5)?,
            end_line: row.get(6)?,
            end_column: row.get(7)?,
            declaration_end_line: row.get(8)?,
            declaration_end_column: row.get(9)?,
            exported: row.get(10)?,
            default_export: row.get(11)?,
            extends_name: row.get(12)?,
            implements_names: decode_names(implements),
            extends_all_names: decode_names(extends_all),
        })
    }

    /// Insert a parsed definition, converting 0-based parser rows to
    /// 1-based stored lines.
    pub fn insert(&self, file_id: FileId, def: &ParsedDefinition) -> StoreResult<DefinitionId> {
        self.conn.execute(
            "INSERT INTO definitions (file_id, name, kind, start_line, start_column, \
             end_line, end_column, declaration_end_line, declaration_end_column, \
             exported, default_export, extends_name, implements_names, extends_all_names)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                file_id,
                def.name,
                def.kind,
                def.start.line(),
                def.start.column,
                def.end.line(),
                def.end.column,
                def.declaration_end.map(|p| p.line()),
                def.declaration_end.map(|p| p.column),
                def.exported,
                def.default_export,
                def.extends,
                encode_names(&def.implements),
                encode_names(&def.extends_all),
            ],
        )?;
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(DefinitionId::new)
            .ok_or(StoreError::IdOverflow {
                table: "definitions",
                rowid,
            })
    }

    /// Update the mutable fields of a matched definition, preserving its
    /// identity.
    pub fn update(&self, id: DefinitionId, def: &ParsedDefinition) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE definitions SET start_line = ?2, start_column = ?3, end_line = ?4, \
             end_column = ?5, declaration_end_line = ?6, declaration_end_column = ?7, \
             exported = ?8, default_export = ?9, extends_name = ?10, \
             implements_names = ?11, extends_all_names = ?12
             WHERE id = ?1",
            rusqlite::params![
                id,
                def.start.line(),
                def.start.column,
                def.end.line(),
                def.end.column,
                def.declaration_end.map(|p| p.line()),
                def.declaration_end.map(|p| p.column),
                def.exported,
                def.default_export,
                def.extends,
                encode_names(&def.implements),
                encode_names(&def.extends_all),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: DefinitionId) -> StoreResult<Option<DefinitionRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM definitions WHERE id = ?1"),
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn by_file(&self, file_id: FileId) -> StoreResult<Vec<DefinitionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM definitions WHERE file_id = ?1 ORDER BY start_line, id"
        ))?;
        let records = stmt
            .query_map([file_id], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn get_by_name(&self, file_id: FileId, name: &str) -> StoreResult<Option<DefinitionId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM definitions WHERE file_id = ?1 AND name = ?2 \
                 ORDER BY id LIMIT 1",
                rusqlite::params![file_id, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Exported name -> definition ID for one file. The default export is
    /// additionally keyed under `"default"`.
    pub fn exported_map(&self, file_id: FileId) -> StoreResult<HashMap<String, DefinitionId>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, id, default_export FROM definitions \
             WHERE file_id = ?1 AND exported = 1",
        )?;
        let mut out = HashMap::new();
        let rows = stmt.query_map([file_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, DefinitionId>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;
        for row in rows {
            let (name, id, default) = row?;
            if default {
                out.insert("default".to_string(), id);
            }
            out.insert(name, id);
        }
        Ok(out)
    }

    /// All definitions with a given name, for inheritance target lookup.
    pub fn by_name_global(&self, name: &str) -> StoreResult<Vec<DefinitionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM definitions WHERE name = ?1 ORDER BY id"
        ))?;
        let records = stmt
            .query_map([name], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Definitions carrying any inheritance names, for edge re-derivation.
    pub fn with_inheritance(&self) -> StoreResult<Vec<DefinitionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM definitions \
             WHERE extends_name IS NOT NULL \
                OR implements_names IS NOT NULL \
                OR extends_all_names IS NOT NULL \
             ORDER BY id"
        ))?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn ids_by_file(&self, file_id: FileId) -> StoreResult<Vec<DefinitionId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM definitions WHERE file_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map([file_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn delete(&self, id: DefinitionId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM definitions WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM definitions", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn encode_names(names: &[String]) -> Option<String> {
    if names.is_empty() {
        None
    } else {
        serde_json::to_string(names).ok()
    }
}

fn decode_names(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::Language;
    use crate::storage::{IndexStore, StoreHandle};
    use crate::Position;
    use std::path::Path;

    fn parsed(name: &str, kind: DefinitionKind) -> ParsedDefinition {
        ParsedDefinition {
            name: name.to_string(),
            kind,
            exported: true,
            default_export: false,
            start: Position::new(0, 0),
            end: Position::new(4, 1),
            declaration_end: Some(Position::new(0, 30)),
            extends: Some("Base".to_string()),
            implements: vec!["Disposable".to_string()],
            extends_all: Vec::new(),
        }
    }

    fn file(store: &IndexStore) -> FileId {
        store
            .files()
            .insert(Path::new("a.ts"), Language::TypeScript, "h", 1, 0)
            .unwrap()
    }

    #[test]
    fn test_insert_load_round_trip() {
        let store = IndexStore::open_in_memory().unwrap();
        let file_id = file(&store);
        let defs = store.definitions();

        let id = defs.insert(file_id, &parsed("save", DefinitionKind::Function)).unwrap();
        let loaded = defs.get(id).unwrap().unwrap();

        assert_eq!(loaded.name, "save");
        assert_eq!(loaded.kind, DefinitionKind::Function);
        // 0-based row 0 stores as line 1.
        assert_eq!(loaded.start_line, 1);
        assert_eq!(loaded.end_line, 5);
        assert_eq!(loaded.declaration_end_line, Some(1));
        assert!(loaded.exported);
        assert_eq!(loaded.extends_name.as_deref(), Some("Base"));
        assert_eq!(loaded.implements_names, vec!["Disposable"]);
    }

    #[test]
    fn test_update_preserves_identity() {
        let store = IndexStore::open_in_memory().unwrap();
        let file_id = file(&store);
        let defs = store.definitions();

        let id = defs.insert(file_id, &parsed("save", DefinitionKind::Function)).unwrap();

        let mut moved = parsed("save", DefinitionKind::Function);
        moved.start = Position::new(10, 0);
        moved.end = Position::new(14, 1);
        moved.exported = false;
        defs.update(id, &moved).unwrap();

        let loaded = defs.get(id).unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.start_line, 11);
        assert!(!loaded.exported);
    }

    #[test]
    fn test_update_same_fields_is_stable() {
        let store = IndexStore::open_in_memory().unwrap();
        let file_id = file(&store);
        let defs = store.definitions();

        let def = parsed("save", DefinitionKind::Function);
        let id = defs.insert(file_id, &def).unwrap();
        let before = defs.get(id).unwrap().unwrap();

        defs.update(id, &def).unwrap();
        let after = defs.get(id).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_exported_map_includes_default_key() {
        let store = IndexStore::open_in_memory().unwrap();
        let file_id = file(&store);
        let defs = store.definitions();

        let mut def = parsed("App", DefinitionKind::Class);
        def.default_export = true;
        let id = defs.insert(file_id, &def).unwrap();

        let mut hidden = parsed("internal", DefinitionKind::Function);
        hidden.exported = false;
        defs.insert(file_id, &hidden).unwrap();

        let map = defs.exported_map(file_id).unwrap();
        assert_eq!(map.get("App"), Some(&id));
        assert_eq!(map.get("default"), Some(&id));
        assert!(!map.contains_key("internal"));
    }

    #[test]
    fn test_contains_line() {
        let store = IndexStore::open_in_memory().unwrap();
        let file_id = file(&store);
        let defs = store.definitions();

        let id = defs.insert(file_id, &parsed("save", DefinitionKind::Function)).unwrap();
        let record = defs.get(id).unwrap().unwrap();

        assert!(record.contains_line(1));
        assert!(record.contains_line(5));
        assert!(!record.contains_line(6));
    }
}
