//! Interaction repository.
//!
//! One row per ordered module pair, plus optional definition-level links
//! narrowing a pair to concrete endpoints. AST-derived rows are re-derived
//! after every sync; inferred and contract-matched rows come from the
//! enrichment pipeline and are what the flow tracer bridges across.

use crate::error::{StoreError, StoreResult};
use crate::storage::{placeholders, PARAM_CHUNK};
use crate::{
    DefinitionId, InteractionDirection, InteractionId, InteractionPattern, InteractionSource,
    ModuleId,
};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub id: InteractionId,
    pub from_module_id: ModuleId,
    pub to_module_id: ModuleId,
    pub direction: InteractionDirection,
    pub weight: u32,
    pub pattern: Option<InteractionPattern>,
    pub semantic: Option<String>,
    pub source: InteractionSource,
    pub confidence: Option<f64>,
    /// Compact `caller -> callee` symbol pairs backing an AST row.
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionDefinitionLink {
    pub interaction_id: InteractionId,
    pub from_definition_id: DefinitionId,
    pub to_definition_id: DefinitionId,
    pub source: InteractionSource,
}

pub struct InteractionRepo<'c> {
    conn: &'c Connection,
}

const COLUMNS: &str = "id, from_module_id, to_module_id, direction, weight, pattern, semantic, \
     source, confidence, symbols";

impl<'c> InteractionRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<InteractionRecord> {
        let symbols: Option<String> = row.get(9)?;
        Ok(InteractionRecord {
            id: row.get(0)?,
            from_module_id: row.get(1)?,
            to_module_id: row.get(2)?,
            direction: row.get(3)?,
            weight: row.get(4)?,
            pattern: row.get(5)?,
            semantic: row.get(6)?,
            source: row.get(7)?,
            confidence: row.get(8)?,
            symbols: symbols
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
        })
    }

    /// Upsert the AST-derived row for a module pair: weight and symbols
    /// are replaced, semantic/pattern narration is preserved, and a row
    /// previously inferred by the LLM keeps its source (AST evidence does
    /// not downgrade it).
    pub fn upsert_ast(
        &self,
        from: ModuleId,
        to: ModuleId,
        weight: u32,
        symbols: &[String],
    ) -> StoreResult<InteractionId> {
        let encoded = if symbols.is_empty() {
            None
        } else {
            Some(serde_json::to_string(symbols)?)
        };
        match self.get_by_pair(from, to)? {
            Some(existing) => {
                self.conn.execute(
                    "UPDATE interactions SET weight = ?2, symbols = ?3 WHERE id = ?1",
                    rusqlite::params![existing.id, weight, encoded],
                )?;
                Ok(existing.id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO interactions (from_module_id, to_module_id, direction, weight, source, symbols)
                     VALUES (?1, ?2, 'uni', ?3, ?4, ?5)",
                    rusqlite::params![from, to, weight, InteractionSource::Ast, encoded],
                )?;
                self.last_id()
            }
        }
    }

    /// Insert or update an enrichment-supplied row (inferred or
    /// contract-matched).
    pub fn upsert_inferred(
        &self,
        from: ModuleId,
        to: ModuleId,
        source: InteractionSource,
        semantic: Option<&str>,
        confidence: Option<f64>,
    ) -> StoreResult<InteractionId> {
        match self.get_by_pair(from, to)? {
            Some(existing) => {
                self.conn.execute(
                    "UPDATE interactions SET source = ?2, semantic = COALESCE(?3, semantic), \
                     confidence = COALESCE(?4, confidence) WHERE id = ?1",
                    rusqlite::params![existing.id, source, semantic, confidence],
                )?;
                Ok(existing.id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO interactions (from_module_id, to_module_id, direction, weight, source, semantic, confidence)
                     VALUES (?1, ?2, 'uni', 0, ?3, ?4, ?5)",
                    rusqlite::params![from, to, source, semantic, confidence],
                )?;
                self.last_id()
            }
        }
    }

    pub fn set_pattern(
        &self,
        id: InteractionId,
        pattern: InteractionPattern,
    ) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE interactions SET pattern = ?2 WHERE id = ?1",
            rusqlite::params![id, pattern],
        )?;
        Ok(())
    }

    pub fn get(&self, id: InteractionId) -> StoreResult<Option<InteractionRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM interactions WHERE id = ?1"),
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_by_pair(
        &self,
        from: ModuleId,
        to: ModuleId,
    ) -> StoreResult<Option<InteractionRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM interactions \
                     WHERE from_module_id = ?1 AND to_module_id = ?2"
                ),
                rusqlite::params![from, to],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn all(&self) -> StoreResult<Vec<InteractionRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM interactions ORDER BY id"))?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Rows the tracer may bridge across: inferred or contract-matched.
    pub fn bridgeable(&self) -> StoreResult<Vec<InteractionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM interactions \
             WHERE source IN ('llm-inferred', 'contract-matched') ORDER BY id"
        ))?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// IDs of interactions touching any of the given modules on either
    /// side.
    pub fn touching_modules(&self, modules: &[ModuleId]) -> StoreResult<Vec<InteractionId>> {
        let mut out = HashSet::new();
        for chunk in modules.chunks(PARAM_CHUNK / 2) {
            let in_clause = placeholders(chunk.len());
            let sql = format!(
                "SELECT id FROM interactions \
                 WHERE from_module_id IN ({in_clause}) OR to_module_id IN ({in_clause})"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                row.get::<_, InteractionId>(0)
            })?;
            for row in rows {
                out.insert(row?);
            }
        }
        let mut result: Vec<InteractionId> = out.into_iter().collect();
        result.sort();
        Ok(result)
    }

    pub fn insert_link(
        &self,
        interaction: InteractionId,
        from: DefinitionId,
        to: DefinitionId,
        source: InteractionSource,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO interaction_definitions (interaction_id, from_definition_id, to_definition_id, source)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(interaction_id, from_definition_id, to_definition_id) DO UPDATE SET source = excluded.source",
            rusqlite::params![interaction, from, to, source],
        )?;
        Ok(())
    }

    pub fn links(&self) -> StoreResult<Vec<InteractionDefinitionLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT interaction_id, from_definition_id, to_definition_id, source
             FROM interaction_definitions ORDER BY id",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(InteractionDefinitionLink {
                    interaction_id: row.get(0)?,
                    from_definition_id: row.get(1)?,
                    to_definition_id: row.get(2)?,
                    source: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn delete(&self, id: InteractionId) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM interaction_definitions WHERE interaction_id = ?1",
            [id],
        )?;
        self.conn
            .execute("DELETE FROM interactions WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM interactions", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn last_id(&self) -> StoreResult<InteractionId> {
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(InteractionId::new)
            .ok_or(StoreError::IdOverflow {
                table: "interactions",
                rowid,
            })
    }
}
