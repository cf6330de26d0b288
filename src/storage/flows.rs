//! Flow repository: flows plus their ordered step tables.
//!
//! Steps come in three shapes: interaction steps (the trace itself),
//! definition steps (concrete endpoints crossed), and subflow links from a
//! composite tier-1 flow to the atomic tier-0 flows it covers. All three
//! cascade-delete with the flow.

use crate::error::{StoreError, StoreResult};
use crate::storage::{placeholders, PARAM_CHUNK};
use crate::{ActionType, DefinitionId, FlowId, InteractionId, ModuleId};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    pub id: FlowId,
    pub slug: String,
    pub display_name: String,
    pub entry_definition_id: Option<DefinitionId>,
    pub entry_module_id: Option<ModuleId>,
    pub stakeholder: Option<String>,
    pub action_type: Option<ActionType>,
    pub target_entity: Option<String>,
    /// 0 = atomic (one interaction), 1 = composite (entry-point trace).
    pub tier: u32,
    pub description: Option<String>,
}

/// Fields for inserting a flow; the store allocates the ID.
#[derive(Debug, Clone, Default)]
pub struct NewFlow {
    pub slug: String,
    pub display_name: String,
    pub entry_definition_id: Option<DefinitionId>,
    pub entry_module_id: Option<ModuleId>,
    pub stakeholder: Option<String>,
    pub action_type: Option<ActionType>,
    pub target_entity: Option<String>,
    pub tier: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStepRecord {
    pub flow_id: FlowId,
    pub step_order: u32,
    pub interaction_id: InteractionId,
}

pub struct FlowRepo<'c> {
    conn: &'c Connection,
}

const COLUMNS: &str = "id, slug, display_name, entry_definition_id, entry_module_id, \
     stakeholder, action_type, target_entity, tier, description";

impl<'c> FlowRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<FlowRecord> {
        Ok(FlowRecord {
            id: row.get(0)?,
            slug: row.get(1)?,
            display_name: row.get(2)?,
            entry_definition_id: row.get(3)?,
            entry_module_id: row.get(4)?,
            stakeholder: row.get(5)?,
            action_type: row.get(6)?,
            target_entity: row.get(7)?,
            tier: row.get(8)?,
            description: row.get(9)?,
        })
    }

    pub fn insert(&self, flow: &NewFlow) -> StoreResult<FlowId> {
        self.conn.execute(
            "INSERT INTO flows (slug, display_name, entry_definition_id, entry_module_id, \
             stakeholder, action_type, target_entity, tier, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                flow.slug,
                flow.display_name,
                flow.entry_definition_id,
                flow.entry_module_id,
                flow.stakeholder,
                flow.action_type,
                flow.target_entity,
                flow.tier,
                flow.description,
            ],
        )?;
        let rowid = self.conn.last_insert_rowid();
        u32::try_from(rowid)
            .ok()
            .and_then(FlowId::new)
            .ok_or(StoreError::IdOverflow {
                table: "flows",
                rowid,
            })
    }

    pub fn get(&self, id: FlowId) -> StoreResult<Option<FlowRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM flows WHERE id = ?1"),
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_by_slug(&self, slug: &str) -> StoreResult<Option<FlowRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM flows WHERE slug = ?1"),
                [slug],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn all(&self) -> StoreResult<Vec<FlowRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM flows ORDER BY id"))?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn add_step(
        &self,
        flow: FlowId,
        step_order: u32,
        interaction: InteractionId,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO flow_steps (flow_id, step_order, interaction_id) VALUES (?1, ?2, ?3)",
            rusqlite::params![flow, step_order, interaction],
        )?;
        Ok(())
    }

    pub fn add_definition_step(
        &self,
        flow: FlowId,
        step_order: u32,
        from: DefinitionId,
        to: DefinitionId,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO flow_definition_steps (flow_id, step_order, from_definition_id, to_definition_id)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![flow, step_order, from, to],
        )?;
        Ok(())
    }

    pub fn add_subflow_step(
        &self,
        flow: FlowId,
        step_order: u32,
        subflow: FlowId,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO flow_subflow_steps (flow_id, step_order, subflow_id) VALUES (?1, ?2, ?3)",
            rusqlite::params![flow, step_order, subflow],
        )?;
        Ok(())
    }

    pub fn steps(&self, flow: FlowId) -> StoreResult<Vec<FlowStepRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT flow_id, step_order, interaction_id FROM flow_steps
             WHERE flow_id = ?1 ORDER BY step_order",
        )?;
        let records = stmt
            .query_map([flow], |row| {
                Ok(FlowStepRecord {
                    flow_id: row.get(0)?,
                    step_order: row.get(1)?,
                    interaction_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn definition_steps(
        &self,
        flow: FlowId,
    ) -> StoreResult<Vec<(u32, DefinitionId, DefinitionId)>> {
        let mut stmt = self.conn.prepare(
            "SELECT step_order, from_definition_id, to_definition_id
             FROM flow_definition_steps WHERE flow_id = ?1 ORDER BY step_order",
        )?;
        let records = stmt
            .query_map([flow], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn subflow_steps(&self, flow: FlowId) -> StoreResult<Vec<FlowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT subflow_id FROM flow_subflow_steps WHERE flow_id = ?1 ORDER BY step_order",
        )?;
        let ids = stmt
            .query_map([flow], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Atomic flows: tier 0 with their single interaction, keyed for the
    /// tracer's subflow accounting.
    pub fn atomic_flows(&self) -> StoreResult<Vec<(FlowId, String, InteractionId)>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.id, f.slug, s.interaction_id
             FROM flows f JOIN flow_steps s ON s.flow_id = f.id
             WHERE f.tier = 0 ORDER BY f.id",
        )?;
        let records = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Flows having at least one step on any of the given interactions.
    pub fn with_step_on(&self, interactions: &[InteractionId]) -> StoreResult<Vec<FlowId>> {
        let mut out = HashSet::new();
        for chunk in interactions.chunks(PARAM_CHUNK) {
            let sql = format!(
                "SELECT DISTINCT flow_id FROM flow_steps WHERE interaction_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                row.get::<_, FlowId>(0)
            })?;
            for row in rows {
                out.insert(row?);
            }
        }
        let mut result: Vec<FlowId> = out.into_iter().collect();
        result.sort();
        Ok(result)
    }

    /// Delete a flow and everything hanging off it.
    pub fn delete_cascade(&self, id: FlowId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM flow_steps WHERE flow_id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM flow_definition_steps WHERE flow_id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM flow_subflow_steps WHERE flow_id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM flow_subflow_steps WHERE subflow_id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM feature_flows WHERE flow_id = ?1", [id])?;
        self.conn.execute("DELETE FROM flows WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM flows", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}
