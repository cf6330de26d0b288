//! Dependency repository: references, symbols, and usages.
//!
//! A reference is an import-like construct between two files. Symbols
//! cross a reference (import) or belong directly to a file (internal
//! usage); exactly one of `reference_id`/`file_id` is set. Usages are the
//! concrete occurrences. All three share one lifecycle: rebuilt in full
//! whenever their from-file is re-parsed.

use crate::error::{StoreError, StoreResult};
use crate::storage::{placeholders, PARAM_CHUNK};
use crate::{DefinitionId, FileId, ImportKind, ReferenceId, ReferenceKind, SymbolId, UsageContext, UsageId};
use rusqlite::{Connection, Row};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRecord {
    pub id: ReferenceId,
    pub from_file_id: FileId,
    pub to_file_id: Option<FileId>,
    pub kind: ReferenceKind,
    pub source: String,
    pub external: bool,
    pub type_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub id: SymbolId,
    pub reference_id: Option<ReferenceId>,
    pub file_id: Option<FileId>,
    pub definition_id: Option<DefinitionId>,
    pub name: String,
    pub local_name: String,
    pub kind: ImportKind,
}

/// A stored usage. Lines are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    pub id: UsageId,
    pub symbol_id: SymbolId,
    pub line: u32,
    pub column: u32,
    pub context: UsageContext,
}

pub struct DependencyRepo<'c> {
    conn: &'c Connection,
}

impl<'c> DependencyRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn reference_from_row(row: &Row<'_>) -> rusqlite::Result<ReferenceRecord> {
        Ok(ReferenceRecord {
            id: row.get(0)?,
            from_file_id: row.get(1)?,
            to_file_id: row.get(2)?,
            kind: row.get(3)?,
            source: row.get(4)?,
            external: row.get(5)?,
            type_only: row.get(6)?,
        })
    }

    fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<SymbolRecord> {
        Ok(SymbolRecord {
            id: row.get(0)?,
            reference_id: row.get(1)?,
            file_id: row.get(2)?,
            definition_id: row.get(3)?,
            name: row.get(4)?,
            local_name: row.get(5)?,
            kind: row.get(6)?,
        })
    }

    pub fn insert_reference(
        &self,
        from_file: FileId,
        to_file: Option<FileId>,
        kind: ReferenceKind,
        source: &str,
        external: bool,
        type_only: bool,
    ) -> StoreResult<ReferenceId> {
        self.conn.execute(
            "INSERT INTO file_references (from_file_id, to_file_id, kind, source, external, type_only)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![from_file, to_file, kind, source, external, type_only],
        )?;
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(ReferenceId::new)
            .ok_or(StoreError::IdOverflow {
                table: "file_references",
                rowid,
            })
    }

    /// Insert a symbol owned by a reference (import) or a file (internal
    /// usage). Exactly one owner must be given.
    pub fn insert_symbol(
        &self,
        reference_id: Option<ReferenceId>,
        file_id: Option<FileId>,
        definition_id: Option<DefinitionId>,
        name: &str,
        local_name: &str,
        kind: ImportKind,
    ) -> StoreResult<SymbolId> {
        debug_assert!(
            reference_id.is_some() != file_id.is_some(),
            "a symbol is owned by exactly one of reference/file"
        );
        self.conn.execute(
            "INSERT INTO symbols (reference_id, file_id, definition_id, name, local_name, kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![reference_id, file_id, definition_id, name, local_name, kind],
        )?;
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(SymbolId::new)
            .ok_or(StoreError::IdOverflow {
                table: "symbols",
                rowid,
            })
    }

    pub fn insert_usage(
        &self,
        symbol_id: SymbolId,
        line: u32,
        column: u32,
        context: UsageContext,
    ) -> StoreResult<UsageId> {
        self.conn.execute(
            "INSERT INTO usages (symbol_id, line, column_number, context)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![symbol_id, line, column, context],
        )?;
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(UsageId::new)
            .ok_or(StoreError::IdOverflow {
                table: "usages",
                rowid,
            })
    }

    pub fn references_from(&self, file_id: FileId) -> StoreResult<Vec<ReferenceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_file_id, to_file_id, kind, source, external, type_only
             FROM file_references WHERE from_file_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map([file_id], Self::reference_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Re-export and export-all references leaving a file, for chain
    /// resolution against stored state.
    pub fn reexports_from(&self, file_id: FileId) -> StoreResult<Vec<ReferenceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_file_id, to_file_id, kind, source, external, type_only
             FROM file_references
             WHERE from_file_id = ?1 AND kind IN ('re-export', 'export-all')
             ORDER BY id",
        )?;
        let records = stmt
            .query_map([file_id], Self::reference_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn symbols_of_reference(&self, reference_id: ReferenceId) -> StoreResult<Vec<SymbolRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, reference_id, file_id, definition_id, name, local_name, kind
             FROM symbols WHERE reference_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map([reference_id], Self::symbol_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn internal_symbols_of_file(&self, file_id: FileId) -> StoreResult<Vec<SymbolRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, reference_id, file_id, definition_id, name, local_name, kind
             FROM symbols WHERE file_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map([file_id], Self::symbol_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn usages_of_symbol(&self, symbol_id: SymbolId) -> StoreResult<Vec<UsageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, symbol_id, line, column_number, context
             FROM usages WHERE symbol_id = ?1 ORDER BY line, column_number",
        )?;
        let records = stmt
            .query_map([symbol_id], |row| {
                Ok(UsageRecord {
                    id: row.get(0)?,
                    symbol_id: row.get(1)?,
                    line: row.get(2)?,
                    column: row.get(3)?,
                    context: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Files that currently import into any of `to_files` (the dependents
    /// that need re-resolution when those files change).
    pub fn files_importing(&self, to_files: &[FileId]) -> StoreResult<Vec<FileId>> {
        let mut out = HashSet::new();
        for chunk in to_files.chunks(PARAM_CHUNK) {
            let sql = format!(
                "SELECT DISTINCT from_file_id FROM file_references WHERE to_file_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(chunk.iter()),
                |row| row.get::<_, FileId>(0),
            )?;
            for row in rows {
                out.insert(row?);
            }
        }
        let mut result: Vec<FileId> = out.into_iter().collect();
        result.sort();
        Ok(result)
    }

    /// Drop every reference, symbol, and usage originating from a file.
    /// Used when the file is re-parsed (they are rebuilt) or deleted.
    pub fn delete_file_dependencies(&self, file_id: FileId) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM usages WHERE symbol_id IN (
                SELECT id FROM symbols
                WHERE file_id = ?1
                   OR reference_id IN (SELECT id FROM file_references WHERE from_file_id = ?1))",
            [file_id],
        )?;
        self.conn.execute(
            "DELETE FROM symbols
             WHERE file_id = ?1
                OR reference_id IN (SELECT id FROM file_references WHERE from_file_id = ?1)",
            [file_id],
        )?;
        self.conn.execute(
            "DELETE FROM file_references WHERE from_file_id = ?1",
            [file_id],
        )?;
        Ok(())
    }

    /// Drop a dependent file's references (and their symbols/usages) that
    /// point at any of the given target files, leaving the rest intact.
    pub fn delete_dependencies_on(
        &self,
        from_file: FileId,
        to_files: &[FileId],
    ) -> StoreResult<()> {
        for chunk in to_files.chunks(PARAM_CHUNK) {
            let in_clause = placeholders(chunk.len());
            let from_param = chunk.len() + 1;

            let usages_sql = format!(
                "DELETE FROM usages WHERE symbol_id IN (
                    SELECT s.id FROM symbols s
                    JOIN file_references r ON s.reference_id = r.id
                    WHERE r.to_file_id IN ({in_clause}) AND r.from_file_id = ?{from_param})"
            );
            let symbols_sql = format!(
                "DELETE FROM symbols WHERE reference_id IN (
                    SELECT id FROM file_references
                    WHERE to_file_id IN ({in_clause}) AND from_file_id = ?{from_param})"
            );
            let references_sql = format!(
                "DELETE FROM file_references
                 WHERE to_file_id IN ({in_clause}) AND from_file_id = ?{from_param}"
            );

            let params: Vec<&dyn rusqlite::ToSql> = chunk
                .iter()
                .map(|id| id as &dyn rusqlite::ToSql)
                .chain(std::iter::once(&from_file as &dyn rusqlite::ToSql))
                .collect();

            self.conn.execute(&usages_sql, params.as_slice())?;
            self.conn.execute(&symbols_sql, params.as_slice())?;
            self.conn.execute(&references_sql, params.as_slice())?;
        }
        Ok(())
    }

    /// Scrub symbols whose owning reference disappeared, and usages whose
    /// symbol did. The dangling-cleanup phase of the sync pipeline.
    pub fn delete_dangling(&self) -> StoreResult<u64> {
        let symbols = self.conn.execute(
            "DELETE FROM symbols
             WHERE reference_id IS NOT NULL
               AND reference_id NOT IN (SELECT id FROM file_references)",
            [],
        )?;
        let usages = self.conn.execute(
            "DELETE FROM usages WHERE symbol_id NOT IN (SELECT id FROM symbols)",
            [],
        )?;
        Ok((symbols + usages) as u64)
    }

    /// Import symbols that did not resolve to a definition. Namespace
    /// imports are excluded: they never have a single target.
    pub fn unresolved_count(&self) -> StoreResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM symbols s
             JOIN file_references r ON s.reference_id = r.id
             WHERE s.definition_id IS NULL AND s.kind != 'namespace' AND r.external = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn reference_count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM file_references", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn symbol_count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}
