//! The sync_dirty table: per-layer pending work for enrichment.
//!
//! Populated inside the sync transaction, drained as each enrichment layer
//! runs, cleared at the start of the next sync. The table is at most a
//! hint: consumers must tolerate a stale or empty table and re-derive
//! correctness from the data itself.

use crate::error::StoreResult;
use crate::{DirtyLayer, DirtyReason};
use rusqlite::{Connection, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyEntry {
    pub layer: DirtyLayer,
    pub entity_id: u32,
    pub reason: DirtyReason,
}

pub struct SyncDirtyRepo<'c> {
    conn: &'c Connection,
}

impl<'c> SyncDirtyRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<DirtyEntry> {
        Ok(DirtyEntry {
            layer: row.get(0)?,
            entity_id: row.get::<_, i64>(1)? as u32,
            reason: row.get(2)?,
        })
    }

    /// Mark an entity dirty. The first reason recorded for a
    /// `(layer, entity)` pair wins; later marks are ignored.
    pub fn mark(&self, layer: DirtyLayer, entity_id: u32, reason: DirtyReason) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sync_dirty (layer, entity_id, reason) VALUES (?1, ?2, ?3)",
            rusqlite::params![layer, entity_id as i64, reason],
        )?;
        Ok(())
    }

    pub fn entries(&self, layer: DirtyLayer) -> StoreResult<Vec<DirtyEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT layer, entity_id, reason FROM sync_dirty WHERE layer = ?1 ORDER BY entity_id",
        )?;
        let records = stmt
            .query_map([layer], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn all(&self) -> StoreResult<Vec<DirtyEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT layer, entity_id, reason FROM sync_dirty ORDER BY layer, entity_id",
        )?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Take a layer's entries, removing them. What enrichment consumers
    /// call as their layer runs.
    pub fn drain(&self, layer: DirtyLayer) -> StoreResult<Vec<DirtyEntry>> {
        let entries = self.entries(layer)?;
        self.conn
            .execute("DELETE FROM sync_dirty WHERE layer = ?1", [layer])?;
        Ok(entries)
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.conn.execute("DELETE FROM sync_dirty", [])?;
        Ok(())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_dirty", [], |row| row.get(0))?;
        Ok(n == 0)
    }
}
