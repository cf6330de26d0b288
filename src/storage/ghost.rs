//! Ghost-row detection and removal.
//!
//! A ghost row is a row whose foreign key no longer resolves, left over
//! when a cascade missed it. Foreign keys are not enforced by the engine
//! (cascades are explicit), so post-sync runs this referential scrub.

use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;

/// A row with a broken foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostRow {
    pub table: &'static str,
    pub rowid: i64,
    /// The column that no longer resolves.
    pub broken_column: &'static str,
}

/// Every foreign-key edge the scrub checks: (table, fk column, parent
/// table, parent key). Nullable columns only count when non-null.
const FOREIGN_KEYS: &[(&str, &str, &str)] = &[
    ("definitions", "file_id", "files"),
    ("file_references", "from_file_id", "files"),
    ("file_references", "to_file_id", "files"),
    ("symbols", "reference_id", "file_references"),
    ("symbols", "file_id", "files"),
    ("symbols", "definition_id", "definitions"),
    ("usages", "symbol_id", "symbols"),
    ("relationships", "from_definition_id", "definitions"),
    ("relationships", "to_definition_id", "definitions"),
    ("modules", "parent_id", "modules"),
    ("module_members", "definition_id", "definitions"),
    ("module_members", "module_id", "modules"),
    ("interactions", "from_module_id", "modules"),
    ("interactions", "to_module_id", "modules"),
    ("interaction_definitions", "interaction_id", "interactions"),
    ("interaction_definitions", "from_definition_id", "definitions"),
    ("interaction_definitions", "to_definition_id", "definitions"),
    ("flows", "entry_definition_id", "definitions"),
    ("flows", "entry_module_id", "modules"),
    ("flow_steps", "flow_id", "flows"),
    ("flow_steps", "interaction_id", "interactions"),
    ("flow_definition_steps", "flow_id", "flows"),
    ("flow_definition_steps", "from_definition_id", "definitions"),
    ("flow_definition_steps", "to_definition_id", "definitions"),
    ("flow_subflow_steps", "flow_id", "flows"),
    ("flow_subflow_steps", "subflow_id", "flows"),
    ("feature_flows", "feature_id", "features"),
    ("feature_flows", "flow_id", "flows"),
    ("call_edges", "from_definition_id", "definitions"),
    ("call_edges", "to_definition_id", "definitions"),
];

pub struct GhostRepo<'c> {
    conn: &'c Connection,
}

impl<'c> GhostRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Enumerate rows whose foreign keys no longer resolve.
    pub fn find_ghost_rows(&self) -> StoreResult<Vec<GhostRow>> {
        let mut out = Vec::new();
        for &(table, column, parent) in FOREIGN_KEYS {
            let sql = format!(
                "SELECT t.rowid FROM {table} t
                 LEFT JOIN {parent} p ON t.{column} = p.id
                 WHERE t.{column} IS NOT NULL AND p.id IS NULL
                 ORDER BY t.rowid"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            for row in rows {
                out.push(GhostRow {
                    table,
                    rowid: row?,
                    broken_column: column,
                });
            }
        }
        Ok(out)
    }

    /// Delete one ghost row by table and rowid. The table name must be one
    /// the scrub knows; arbitrary names are refused.
    pub fn delete_ghost_row(&self, table: &str, rowid: i64) -> StoreResult<()> {
        let known = FOREIGN_KEYS.iter().find(|(t, _, _)| *t == table);
        let Some(&(table, _, _)) = known else {
            return Err(StoreError::BrokenReference {
                table: "ghost scrub",
                referenced: "table",
                detail: format!("unknown table '{table}'"),
            });
        };
        self.conn
            .execute(&format!("DELETE FROM {table} WHERE rowid = ?1"), [rowid])?;
        Ok(())
    }

    /// Find and delete every ghost row. Idempotent; safe to run twice.
    /// Returns the number of rows removed.
    pub fn scrub(&self) -> StoreResult<u64> {
        // Deleting one ghost can orphan another (usage -> symbol ->
        // reference), so iterate until a pass finds nothing.
        let mut total = 0u64;
        loop {
            let ghosts = self.find_ghost_rows()?;
            if ghosts.is_empty() {
                return Ok(total);
            }
            for ghost in &ghosts {
                self.delete_ghost_row(ghost.table, ghost.rowid)?;
            }
            total += ghosts.len() as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::Language;
    use crate::storage::{IndexStore, StoreHandle};
    use crate::{ImportKind, ReferenceKind, UsageContext};
    use std::path::Path;

    #[test]
    fn test_clean_store_has_no_ghosts() {
        let store = IndexStore::open_in_memory().unwrap();
        assert!(store.ghosts().find_ghost_rows().unwrap().is_empty());
    }

    #[test]
    fn test_scrub_cascading_ghosts() {
        let store = IndexStore::open_in_memory().unwrap();
        let files = store.files();
        let deps = store.dependencies();

        let a = files
            .insert(Path::new("a.ts"), Language::TypeScript, "ha", 1, 0)
            .unwrap();
        let b = files
            .insert(Path::new("b.ts"), Language::TypeScript, "hb", 1, 0)
            .unwrap();
        let r = deps
            .insert_reference(a, Some(b), ReferenceKind::Import, "./b", false, false)
            .unwrap();
        let sym = deps
            .insert_symbol(Some(r), None, None, "x", "x", ImportKind::Named)
            .unwrap();
        deps.insert_usage(sym, 1, 0, UsageContext::Call).unwrap();

        // Drop the reference directly; symbol and usage become ghosts,
        // the usage only transitively.
        store
            .raw()
            .execute("DELETE FROM file_references WHERE id = ?1", [r])
            .unwrap();

        let ghosts = store.ghosts().find_ghost_rows().unwrap();
        assert_eq!(ghosts.len(), 1);
        assert_eq!(ghosts[0].table, "symbols");

        let removed = store.ghosts().scrub().unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.ghosts().scrub().unwrap(), 0);
        assert_eq!(deps.symbol_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_unknown_table_refused() {
        let store = IndexStore::open_in_memory().unwrap();
        assert!(store.ghosts().delete_ghost_row("files; DROP TABLE files", 1).is_err());
    }
}
