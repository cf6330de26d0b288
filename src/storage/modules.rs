//! Module tree and membership repository.
//!
//! Modules form a tree with a single root. Slugs are unique per parent and
//! `full_path` is the literal dot-joined concatenation of ancestor slugs.
//! Each definition belongs to at most one module.

use crate::error::{StoreError, StoreResult};
use crate::storage::{placeholders, PARAM_CHUNK};
use crate::{DefinitionId, ModuleId};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub parent_id: Option<ModuleId>,
    pub slug: String,
    pub full_path: String,
    pub display_name: String,
    pub depth: u32,
    pub is_test: bool,
}

pub struct ModuleRepo<'c> {
    conn: &'c Connection,
}

impl<'c> ModuleRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<ModuleRecord> {
        Ok(ModuleRecord {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            slug: row.get(2)?,
            full_path: row.get(3)?,
            display_name: row.get(4)?,
            depth: row.get(5)?,
            is_test: row.get(6)?,
        })
    }

    /// Insert a module under `parent` (`None` for the root). The full path
    /// and depth derive from the parent; they are never supplied.
    pub fn insert(
        &self,
        parent: Option<ModuleId>,
        slug: &str,
        display_name: &str,
        is_test: bool,
    ) -> StoreResult<ModuleId> {
        let (full_path, depth) = match parent {
            Some(parent_id) => {
                let parent_record =
                    self.get(parent_id)?
                        .ok_or_else(|| StoreError::BrokenReference {
                            table: "modules",
                            referenced: "parent module",
                            detail: format!("parent {parent_id} does not exist"),
                        })?;
                (
                    format!("{}.{slug}", parent_record.full_path),
                    parent_record.depth + 1,
                )
            }
            None => (slug.to_string(), 0),
        };

        self.conn.execute(
            "INSERT INTO modules (parent_id, slug, full_path, display_name, depth, is_test)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![parent, slug, full_path, display_name, depth, is_test],
        )?;
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(ModuleId::new)
            .ok_or(StoreError::IdOverflow {
                table: "modules",
                rowid,
            })
    }

    pub fn get(&self, id: ModuleId) -> StoreResult<Option<ModuleRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, parent_id, slug, full_path, display_name, depth, is_test
                 FROM modules WHERE id = ?1",
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn by_full_path(&self, full_path: &str) -> StoreResult<Option<ModuleRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, parent_id, slug, full_path, display_name, depth, is_test
                 FROM modules WHERE full_path = ?1",
                [full_path],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn children(&self, parent: ModuleId) -> StoreResult<Vec<ModuleRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, parent_id, slug, full_path, display_name, depth, is_test
             FROM modules WHERE parent_id = ?1 ORDER BY slug",
        )?;
        let records = stmt
            .query_map([parent], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn all(&self) -> StoreResult<Vec<ModuleRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, parent_id, slug, full_path, display_name, depth, is_test
             FROM modules ORDER BY id",
        )?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM modules", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Assign a definition to a module, replacing any previous assignment.
    pub fn assign_member(&self, definition: DefinitionId, module: ModuleId) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO module_members (definition_id, module_id) VALUES (?1, ?2)
             ON CONFLICT(definition_id) DO UPDATE SET module_id = excluded.module_id",
            rusqlite::params![definition, module],
        )?;
        Ok(())
    }

    pub fn member_module(&self, definition: DefinitionId) -> StoreResult<Option<ModuleId>> {
        let module = self
            .conn
            .query_row(
                "SELECT module_id FROM module_members WHERE definition_id = ?1",
                [definition],
                |row| row.get(0),
            )
            .optional()?;
        Ok(module)
    }

    /// Module IDs of the given definitions. Definitions without an
    /// assignment are simply absent from the result.
    pub fn modules_of(
        &self,
        definitions: &[DefinitionId],
    ) -> StoreResult<HashMap<DefinitionId, ModuleId>> {
        let mut out = HashMap::new();
        for chunk in definitions.chunks(PARAM_CHUNK) {
            let sql = format!(
                "SELECT definition_id, module_id FROM module_members WHERE definition_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, DefinitionId>(0)?, row.get::<_, ModuleId>(1)?))
            })?;
            for row in rows {
                let (def, module) = row?;
                out.insert(def, module);
            }
        }
        Ok(out)
    }

    /// The full membership table, definition -> module.
    pub fn membership(&self) -> StoreResult<HashMap<DefinitionId, ModuleId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT definition_id, module_id FROM module_members")?;
        let mut out = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, DefinitionId>(0)?, row.get::<_, ModuleId>(1)?))
        })?;
        for row in rows {
            let (def, module) = row?;
            out.insert(def, module);
        }
        Ok(out)
    }

    pub fn members(&self, module: ModuleId) -> StoreResult<Vec<DefinitionId>> {
        let mut stmt = self.conn.prepare(
            "SELECT definition_id FROM module_members WHERE module_id = ?1 ORDER BY definition_id",
        )?;
        let ids = stmt
            .query_map([module], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn remove_member(&self, definition: DefinitionId) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM module_members WHERE definition_id = ?1",
            [definition],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: ModuleId) -> StoreResult<()> {
        self.conn.execute("DELETE FROM modules WHERE id = ?1", [id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{IndexStore, StoreHandle};

    #[test]
    fn test_full_path_concatenation() {
        let store = IndexStore::open_in_memory().unwrap();
        let modules = store.modules();

        let root = modules.insert(None, "app", "App", false).unwrap();
        let orders = modules.insert(Some(root), "orders", "Orders", false).unwrap();
        let api = modules.insert(Some(orders), "api", "Orders API", false).unwrap();

        let record = modules.get(api).unwrap().unwrap();
        assert_eq!(record.full_path, "app.orders.api");
        assert_eq!(record.depth, 2);

        let found = modules.by_full_path("app.orders.api").unwrap().unwrap();
        assert_eq!(found.id, api);
    }

    #[test]
    fn test_sibling_slug_unique() {
        let store = IndexStore::open_in_memory().unwrap();
        let modules = store.modules();

        let root = modules.insert(None, "app", "App", false).unwrap();
        modules.insert(Some(root), "orders", "Orders", false).unwrap();
        assert!(modules.insert(Some(root), "orders", "Orders 2", false).is_err());
    }

    #[test]
    fn test_missing_parent_rejected() {
        let store = IndexStore::open_in_memory().unwrap();
        let modules = store.modules();
        let ghost = ModuleId::new(999).unwrap();
        assert!(modules.insert(Some(ghost), "x", "X", false).is_err());
    }

    #[test]
    fn test_membership_reassignment() {
        let store = IndexStore::open_in_memory().unwrap();
        let modules = store.modules();
        let file = store
            .files()
            .insert(
                std::path::Path::new("a.ts"),
                crate::parsing::Language::TypeScript,
                "h",
                1,
                0,
            )
            .unwrap();
        let def = store
            .definitions()
            .insert(
                file,
                &crate::parsing::ParsedDefinition {
                    name: "save".to_string(),
                    kind: crate::DefinitionKind::Function,
                    exported: true,
                    default_export: false,
                    start: crate::Position::new(0, 0),
                    end: crate::Position::new(1, 0),
                    declaration_end: None,
                    extends: None,
                    implements: Vec::new(),
                    extends_all: Vec::new(),
                },
            )
            .unwrap();

        let a = modules.insert(None, "a", "A", false).unwrap();
        let b = modules.insert(Some(a), "b", "B", false).unwrap();

        modules.assign_member(def, a).unwrap();
        assert_eq!(modules.member_module(def).unwrap(), Some(a));

        modules.assign_member(def, b).unwrap();
        assert_eq!(modules.member_module(def).unwrap(), Some(b));
        assert_eq!(modules.members(a).unwrap().len(), 0);
        assert_eq!(modules.members(b).unwrap(), vec![def]);
    }
}
