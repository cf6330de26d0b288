//! Key-value metadata repository.
//!
//! Holds the schema version, the last sync timestamp, and whatever small
//! state the enrichment pipeline wants to park.

use crate::error::StoreResult;
use rusqlite::{Connection, OptionalExtension};

pub struct MetadataRepo<'c> {
    conn: &'c Connection,
}

impl<'c> MetadataRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM metadata WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{IndexStore, StoreHandle};

    #[test]
    fn test_set_get_overwrite() {
        let store = IndexStore::open_in_memory().unwrap();
        let meta = store.metadata();

        assert_eq!(meta.get("last_sync").unwrap(), None);
        meta.set("last_sync", "100").unwrap();
        meta.set("last_sync", "200").unwrap();
        assert_eq!(meta.get("last_sync").unwrap(), Some("200".to_string()));

        assert!(meta.delete("last_sync").unwrap());
        assert!(!meta.delete("last_sync").unwrap());
    }
}
