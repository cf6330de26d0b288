//! Feature repository: named groupings of flows.

use crate::error::{StoreError, StoreResult};
use crate::storage::{placeholders, PARAM_CHUNK};
use crate::{FeatureId, FlowId};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRecord {
    pub id: FeatureId,
    pub slug: String,
    pub display_name: String,
    pub description: Option<String>,
}

pub struct FeatureRepo<'c> {
    conn: &'c Connection,
}

impl<'c> FeatureRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<FeatureRecord> {
        Ok(FeatureRecord {
            id: row.get(0)?,
            slug: row.get(1)?,
            display_name: row.get(2)?,
            description: row.get(3)?,
        })
    }

    pub fn insert(
        &self,
        slug: &str,
        display_name: &str,
        description: Option<&str>,
    ) -> StoreResult<FeatureId> {
        self.conn.execute(
            "INSERT INTO features (slug, display_name, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![slug, display_name, description],
        )?;
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(FeatureId::new)
            .ok_or(StoreError::IdOverflow {
                table: "features",
                rowid,
            })
    }

    pub fn get_by_slug(&self, slug: &str) -> StoreResult<Option<FeatureRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, slug, display_name, description FROM features WHERE slug = ?1",
                [slug],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn all(&self) -> StoreResult<Vec<FeatureRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, slug, display_name, description FROM features ORDER BY id")?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn attach_flow(&self, feature: FeatureId, flow: FlowId) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO feature_flows (feature_id, flow_id) VALUES (?1, ?2)",
            rusqlite::params![feature, flow],
        )?;
        Ok(())
    }

    pub fn flows_of(&self, feature: FeatureId) -> StoreResult<Vec<FlowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT flow_id FROM feature_flows WHERE feature_id = ?1 ORDER BY flow_id",
        )?;
        let ids = stmt
            .query_map([feature], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Features containing any of the given flows.
    pub fn containing(&self, flows: &[FlowId]) -> StoreResult<Vec<FeatureId>> {
        let mut out = HashSet::new();
        for chunk in flows.chunks(PARAM_CHUNK) {
            let sql = format!(
                "SELECT DISTINCT feature_id FROM feature_flows WHERE flow_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                row.get::<_, FeatureId>(0)
            })?;
            for row in rows {
                out.insert(row?);
            }
        }
        let mut result: Vec<FeatureId> = out.into_iter().collect();
        result.sort();
        Ok(result)
    }

    pub fn delete(&self, id: FeatureId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM feature_flows WHERE feature_id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM features WHERE id = ?1", [id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{IndexStore, NewFlow, StoreHandle};

    #[test]
    fn test_feature_flow_association() {
        let store = IndexStore::open_in_memory().unwrap();
        let features = store.features();
        let flows = store.flows();

        let flow = flows
            .insert(&NewFlow {
                slug: "create-order".to_string(),
                display_name: "CreateOrder".to_string(),
                ..Default::default()
            })
            .unwrap();
        let feature = features
            .insert("ordering", "Ordering", Some("Order placement"))
            .unwrap();

        features.attach_flow(feature, flow).unwrap();
        features.attach_flow(feature, flow).unwrap(); // idempotent

        assert_eq!(features.flows_of(feature).unwrap(), vec![flow]);
        assert_eq!(features.containing(&[flow]).unwrap(), vec![feature]);

        features.delete(feature).unwrap();
        assert!(features.get_by_slug("ordering").unwrap().is_none());
    }
}
