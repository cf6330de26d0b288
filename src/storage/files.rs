//! File repository.

use crate::error::{StoreError, StoreResult};
use crate::parsing::Language;
use crate::FileId;
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A tracked source file. `path` is relative to the indexed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub path: PathBuf,
    pub language: Language,
    pub hash: String,
    pub size: u64,
    pub mtime: i64,
}

pub struct FileRepo<'c> {
    conn: &'c Connection,
}

impl<'c> FileRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
        Ok(FileRecord {
            id: row.get(0)?,
            path: PathBuf::from(row.get::<_, String>(1)?),
            language: row.get(2)?,
            hash: row.get(3)?,
            size: row.get::<_, i64>(4)? as u64,
            mtime: row.get(5)?,
        })
    }

    /// Insert a new file. Paths are unique; inserting a duplicate is a
    /// caller bug and surfaces as a constraint error.
    pub fn insert(
        &self,
        path: &Path,
        language: Language,
        hash: &str,
        size: u64,
        mtime: i64,
    ) -> StoreResult<FileId> {
        self.conn.execute(
            "INSERT INTO files (path, language, hash, size, mtime)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![path_str(path), language, hash, size as i64, mtime],
        )?;
        self.last_id()
    }

    pub fn update_content(
        &self,
        id: FileId,
        hash: &str,
        size: u64,
        mtime: i64,
    ) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE files SET hash = ?2, size = ?3, mtime = ?4 WHERE id = ?1",
            rusqlite::params![id, hash, size as i64, mtime],
        )?;
        Ok(())
    }

    pub fn get(&self, id: FileId) -> StoreResult<Option<FileRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, path, language, hash, size, mtime FROM files WHERE id = ?1",
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_by_path(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, path, language, hash, size, mtime FROM files WHERE path = ?1",
                [path_str(path)],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn all(&self) -> StoreResult<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, path, language, hash, size, mtime FROM files ORDER BY id")?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Map of relative path to `(id, hash)`, the change detector's view of
    /// previous state.
    pub fn hash_map(&self) -> StoreResult<HashMap<PathBuf, (FileId, String)>> {
        let mut stmt = self.conn.prepare("SELECT path, id, hash FROM files")?;
        let mut out = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                PathBuf::from(row.get::<_, String>(0)?),
                row.get::<_, FileId>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (path, id, hash) = row?;
            out.insert(path, (id, hash));
        }
        Ok(out)
    }

    /// Delete the file row only; the sync engine cascades the subtree
    /// explicitly before calling this.
    pub fn delete(&self, id: FileId) -> StoreResult<()> {
        self.conn.execute("DELETE FROM files WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn last_id(&self) -> StoreResult<FileId> {
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(FileId::new)
            .ok_or(StoreError::IdOverflow {
                table: "files",
                rowid,
            })
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
