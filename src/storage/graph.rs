//! Call-graph repository.
//!
//! The definition-level call graph is derived, not parsed: a call edge
//! `D -> T` exists when a call/new usage inside `D`'s body resolves to
//! definition `T`. Edges are materialized into the `call_edges` table
//! during post-sync and projected both ways by the queries here.

use crate::error::StoreResult;
use crate::{DefinitionId, FileId};
use rusqlite::{Connection, Row};
use std::collections::HashMap;

/// One aggregated call edge. `min_usage_line` is the first call site,
/// kept for ordering traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEdge {
    pub from_definition_id: DefinitionId,
    pub to_definition_id: DefinitionId,
    pub weight: u32,
    pub min_usage_line: u32,
}

pub struct GraphRepo<'c> {
    conn: &'c Connection,
}

impl<'c> GraphRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<CallEdge> {
        Ok(CallEdge {
            from_definition_id: row.get(0)?,
            to_definition_id: row.get(1)?,
            weight: row.get(2)?,
            min_usage_line: row.get(3)?,
        })
    }

    /// Recompute the call_edges table from current usages.
    ///
    /// For every invocation usage whose symbol resolved, the enclosing
    /// definition is the innermost definition of the owning file whose
    /// body spans the usage line. Self-edges are excluded. Returns the
    /// number of edges materialized.
    pub fn rebuild(&self) -> StoreResult<u64> {
        // Definition intervals per file, for enclosing-definition lookup.
        let mut intervals: HashMap<FileId, Vec<(DefinitionId, u32, u32)>> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT id, file_id, start_line, end_line FROM definitions")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, DefinitionId>(0)?,
                    row.get::<_, FileId>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                ))
            })?;
            for row in rows {
                let (id, file, start, end) = row?;
                intervals.entry(file).or_default().push((id, start, end));
            }
        }

        // Resolved invocation usages with the file whose source contains them.
        let mut edges: HashMap<(DefinitionId, DefinitionId), (u32, u32)> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT COALESCE(s.file_id, r.from_file_id), u.line, s.definition_id
                 FROM usages u
                 JOIN symbols s ON u.symbol_id = s.id
                 LEFT JOIN file_references r ON s.reference_id = r.id
                 WHERE s.definition_id IS NOT NULL AND u.context IN ('call', 'new')",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, FileId>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, DefinitionId>(2)?,
                ))
            })?;
            for row in rows {
                let (owner_file, line, target) = row?;
                let Some(candidates) = intervals.get(&owner_file) else {
                    continue;
                };
                let Some(enclosing) = innermost(candidates, line) else {
                    continue;
                };
                if enclosing == target {
                    continue;
                }
                let entry = edges.entry((enclosing, target)).or_insert((0, line));
                entry.0 += 1;
                entry.1 = entry.1.min(line);
            }
        }

        self.conn.execute("DELETE FROM call_edges", [])?;
        let mut insert = self.conn.prepare(
            "INSERT INTO call_edges (from_definition_id, to_definition_id, weight, min_usage_line)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for ((from, to), (weight, min_line)) in &edges {
            insert.execute(rusqlite::params![from, to, weight, min_line])?;
        }
        Ok(edges.len() as u64)
    }

    /// Outgoing edges: whom does this definition call.
    pub fn callsites(&self, def: DefinitionId) -> StoreResult<Vec<CallEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_definition_id, to_definition_id, weight, min_usage_line
             FROM call_edges WHERE from_definition_id = ?1
             ORDER BY min_usage_line, to_definition_id",
        )?;
        let edges = stmt
            .query_map([def], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Incoming edges: who calls this definition.
    pub fn incoming(&self, def: DefinitionId) -> StoreResult<Vec<CallEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_definition_id, to_definition_id, weight, min_usage_line
             FROM call_edges WHERE to_definition_id = ?1
             ORDER BY from_definition_id",
        )?;
        let edges = stmt
            .query_map([def], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Every edge, ordered for deterministic downstream traversal.
    pub fn all_edges(&self) -> StoreResult<Vec<CallEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_definition_id, to_definition_id, weight, min_usage_line
             FROM call_edges
             ORDER BY from_definition_id, min_usage_line, to_definition_id",
        )?;
        let edges = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Call edges with no relationship annotation yet, for the enrichment
    /// queue.
    pub fn unannotated_edges(&self, limit: u32) -> StoreResult<Vec<CallEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.from_definition_id, c.to_definition_id, c.weight, c.min_usage_line
             FROM call_edges c
             LEFT JOIN relationships rel
               ON rel.from_definition_id = c.from_definition_id
              AND rel.to_definition_id = c.to_definition_id
             WHERE rel.id IS NULL
             ORDER BY c.weight DESC, c.from_definition_id, c.to_definition_id
             LIMIT ?1",
        )?;
        let edges = stmt
            .query_map([limit], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    pub fn edge_count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM call_edges", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

/// The innermost definition whose body contains `line`: the latest start,
/// breaking ties by the narrowest span.
fn innermost(candidates: &[(DefinitionId, u32, u32)], line: u32) -> Option<DefinitionId> {
    candidates
        .iter()
        .filter(|(_, start, end)| line >= *start && line <= *end)
        .min_by_key(|(_, start, end)| (std::cmp::Reverse(*start), end - start))
        .map(|(id, _, _)| *id)
}
