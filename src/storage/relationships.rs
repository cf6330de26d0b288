//! Relationship annotation repository.
//!
//! One row per ordered definition pair. The upsert policy preserves the
//! stronger type: `extends`/`implements` beat `uses`. Inheritance edges are
//! created with a placeholder semantic and narrated later by the
//! enrichment pipeline.

use crate::error::{StoreError, StoreResult};
use crate::{DefinitionId, RelationshipId, RelationshipType};
use rusqlite::{Connection, OptionalExtension, Row};

/// Semantic marking an inheritance edge that awaits LLM narration.
pub const PENDING_ANNOTATION: &str = "PENDING_LLM_ANNOTATION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub id: RelationshipId,
    pub from_definition_id: DefinitionId,
    pub to_definition_id: DefinitionId,
    pub relationship_type: RelationshipType,
    pub semantic: String,
}

pub struct RelationshipRepo<'c> {
    conn: &'c Connection,
}

impl<'c> RelationshipRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<RelationshipRecord> {
        Ok(RelationshipRecord {
            id: row.get(0)?,
            from_definition_id: row.get(1)?,
            to_definition_id: row.get(2)?,
            relationship_type: row.get(3)?,
            semantic: row.get(4)?,
        })
    }

    pub fn get(
        &self,
        from: DefinitionId,
        to: DefinitionId,
    ) -> StoreResult<Option<RelationshipRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, from_definition_id, to_definition_id, relationship_type, semantic
                 FROM relationships
                 WHERE from_definition_id = ?1 AND to_definition_id = ?2",
                rusqlite::params![from, to],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Upsert an annotation. The stored type only ever gets stronger; the
    /// semantic is replaced by the caller's.
    pub fn annotate(
        &self,
        from: DefinitionId,
        to: DefinitionId,
        semantic: &str,
        relationship_type: RelationshipType,
    ) -> StoreResult<RelationshipId> {
        match self.get(from, to)? {
            Some(existing) => {
                let kept_type =
                    if relationship_type.strength() > existing.relationship_type.strength() {
                        relationship_type
                    } else {
                        existing.relationship_type
                    };
                self.conn.execute(
                    "UPDATE relationships SET relationship_type = ?2, semantic = ?3 WHERE id = ?1",
                    rusqlite::params![existing.id, kept_type, semantic],
                )?;
                Ok(existing.id)
            }
            None => self.insert(from, to, semantic, relationship_type),
        }
    }

    /// Ensure an inheritance edge exists, inserting with the pending
    /// placeholder. An existing row only has its type upgraded; a real
    /// semantic is never reset to the placeholder. Returns whether a row
    /// was inserted.
    pub fn ensure_inheritance(
        &self,
        from: DefinitionId,
        to: DefinitionId,
        relationship_type: RelationshipType,
    ) -> StoreResult<bool> {
        debug_assert!(relationship_type.strength() > RelationshipType::Uses.strength());
        match self.get(from, to)? {
            Some(existing) => {
                if relationship_type.strength() > existing.relationship_type.strength() {
                    self.conn.execute(
                        "UPDATE relationships SET relationship_type = ?2 WHERE id = ?1",
                        rusqlite::params![existing.id, relationship_type],
                    )?;
                }
                Ok(false)
            }
            None => {
                self.insert(from, to, PENDING_ANNOTATION, relationship_type)?;
                Ok(true)
            }
        }
    }

    fn insert(
        &self,
        from: DefinitionId,
        to: DefinitionId,
        semantic: &str,
        relationship_type: RelationshipType,
    ) -> StoreResult<RelationshipId> {
        self.conn.execute(
            "INSERT INTO relationships (from_definition_id, to_definition_id, relationship_type, semantic)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![from, to, relationship_type, semantic],
        )?;
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(RelationshipId::new)
            .ok_or(StoreError::IdOverflow {
                table: "relationships",
                rowid,
            })
    }

    pub fn all(&self) -> StoreResult<Vec<RelationshipRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_definition_id, to_definition_id, relationship_type, semantic
             FROM relationships ORDER BY id",
        )?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Inheritance rows still carrying the placeholder semantic.
    pub fn pending_inheritance(&self, limit: u32) -> StoreResult<Vec<RelationshipRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_definition_id, to_definition_id, relationship_type, semantic
             FROM relationships
             WHERE semantic = ?1 AND relationship_type IN ('extends', 'implements')
             ORDER BY id LIMIT ?2",
        )?;
        let records = stmt
            .query_map(rusqlite::params![PENDING_ANNOTATION, limit], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Peer relationships: every annotation touching a definition on
    /// either side.
    pub fn touching(&self, def: DefinitionId) -> StoreResult<Vec<RelationshipRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_definition_id, to_definition_id, relationship_type, semantic
             FROM relationships
             WHERE from_definition_id = ?1 OR to_definition_id = ?1
             ORDER BY id",
        )?;
        let records = stmt
            .query_map([def], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn delete(&self, id: RelationshipId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM relationships WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::Language;
    use crate::storage::{IndexStore, StoreHandle};
    use crate::{DefinitionKind, Position};
    use std::path::Path;

    fn two_defs(store: &IndexStore) -> (DefinitionId, DefinitionId) {
        let file = store
            .files()
            .insert(Path::new("a.ts"), Language::TypeScript, "h", 1, 0)
            .unwrap();
        let defs = store.definitions();
        let mk = |name: &str| crate::parsing::ParsedDefinition {
            name: name.to_string(),
            kind: DefinitionKind::Class,
            exported: true,
            default_export: false,
            start: Position::new(0, 0),
            end: Position::new(2, 0),
            declaration_end: None,
            extends: None,
            implements: Vec::new(),
            extends_all: Vec::new(),
        };
        (
            defs.insert(file, &mk("A")).unwrap(),
            defs.insert(file, &mk("B")).unwrap(),
        )
    }

    #[test]
    fn test_stronger_type_survives_uses_upsert() {
        let store = IndexStore::open_in_memory().unwrap();
        let (a, b) = two_defs(&store);
        let rels = store.relationships();

        rels.annotate(a, b, "A extends B", RelationshipType::Extends)
            .unwrap();
        rels.annotate(a, b, "A calls B", RelationshipType::Uses)
            .unwrap();

        let record = rels.get(a, b).unwrap().unwrap();
        assert_eq!(record.relationship_type, RelationshipType::Extends);
        assert_eq!(record.semantic, "A calls B");
    }

    #[test]
    fn test_uses_upgrades_to_implements() {
        let store = IndexStore::open_in_memory().unwrap();
        let (a, b) = two_defs(&store);
        let rels = store.relationships();

        rels.annotate(a, b, "A calls B", RelationshipType::Uses)
            .unwrap();
        rels.annotate(a, b, "A implements B", RelationshipType::Implements)
            .unwrap();

        let record = rels.get(a, b).unwrap().unwrap();
        assert_eq!(record.relationship_type, RelationshipType::Implements);
    }

    #[test]
    fn test_ensure_inheritance_idempotent() {
        let store = IndexStore::open_in_memory().unwrap();
        let (a, b) = two_defs(&store);
        let rels = store.relationships();

        assert!(rels.ensure_inheritance(a, b, RelationshipType::Extends).unwrap());
        assert!(!rels.ensure_inheritance(a, b, RelationshipType::Extends).unwrap());
        assert_eq!(rels.count().unwrap(), 1);

        let record = rels.get(a, b).unwrap().unwrap();
        assert_eq!(record.semantic, PENDING_ANNOTATION);
    }

    #[test]
    fn test_ensure_inheritance_keeps_real_semantic() {
        let store = IndexStore::open_in_memory().unwrap();
        let (a, b) = two_defs(&store);
        let rels = store.relationships();

        rels.annotate(a, b, "A uses B for storage", RelationshipType::Uses)
            .unwrap();
        rels.ensure_inheritance(a, b, RelationshipType::Extends).unwrap();

        let record = rels.get(a, b).unwrap().unwrap();
        assert_eq!(record.relationship_type, RelationshipType::Extends);
        assert_eq!(record.semantic, "A uses B for storage");
    }

    #[test]
    fn test_pending_inheritance_query() {
        let store = IndexStore::open_in_memory().unwrap();
        let (a, b) = two_defs(&store);
        let rels = store.relationships();

        rels.ensure_inheritance(a, b, RelationshipType::Extends).unwrap();
        assert_eq!(rels.pending_inheritance(10).unwrap().len(), 1);

        rels.annotate(a, b, "A specializes B", RelationshipType::Extends)
            .unwrap();
        assert!(rels.pending_inheritance(10).unwrap().is_empty());
    }
}
