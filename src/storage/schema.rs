//! Schema DDL and forward-only migrations.
//!
//! The schema version lives in the `metadata` key-value table. Migrations
//! run inside one transaction at connection open; a failed migration rolls
//! back and surfaces a fatal error, leaving the store unchanged.

use crate::error::{StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata key holding the schema version.
pub const VERSION_KEY: &str = "schema_version";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    language TEXT NOT NULL,
    hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS definitions (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id),
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    start_column INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    end_column INTEGER NOT NULL,
    declaration_end_line INTEGER,
    declaration_end_column INTEGER,
    exported INTEGER NOT NULL DEFAULT 0,
    default_export INTEGER NOT NULL DEFAULT 0,
    extends_name TEXT,
    implements_names TEXT,
    extends_all_names TEXT
);
CREATE INDEX IF NOT EXISTS idx_definitions_file ON definitions(file_id);
CREATE INDEX IF NOT EXISTS idx_definitions_identity ON definitions(file_id, name, kind);
CREATE INDEX IF NOT EXISTS idx_definitions_name ON definitions(name);

CREATE TABLE IF NOT EXISTS file_references (
    id INTEGER PRIMARY KEY,
    from_file_id INTEGER NOT NULL REFERENCES files(id),
    to_file_id INTEGER REFERENCES files(id),
    kind TEXT NOT NULL,
    source TEXT NOT NULL,
    external INTEGER NOT NULL DEFAULT 0,
    type_only INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_references_from ON file_references(from_file_id);
CREATE INDEX IF NOT EXISTS idx_references_to ON file_references(to_file_id);

CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY,
    reference_id INTEGER REFERENCES file_references(id),
    file_id INTEGER REFERENCES files(id),
    definition_id INTEGER REFERENCES definitions(id),
    name TEXT NOT NULL,
    local_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    CHECK ((reference_id IS NULL) <> (file_id IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_symbols_reference ON symbols(reference_id);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);
CREATE INDEX IF NOT EXISTS idx_symbols_definition ON symbols(definition_id);

CREATE TABLE IF NOT EXISTS usages (
    id INTEGER PRIMARY KEY,
    symbol_id INTEGER NOT NULL REFERENCES symbols(id),
    line INTEGER NOT NULL,
    column_number INTEGER NOT NULL,
    context TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usages_symbol ON usages(symbol_id);

CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY,
    from_definition_id INTEGER NOT NULL REFERENCES definitions(id),
    to_definition_id INTEGER NOT NULL REFERENCES definitions(id),
    relationship_type TEXT NOT NULL,
    semantic TEXT NOT NULL,
    UNIQUE (from_definition_id, to_definition_id)
);
CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_definition_id);

CREATE TABLE IF NOT EXISTS modules (
    id INTEGER PRIMARY KEY,
    parent_id INTEGER REFERENCES modules(id),
    slug TEXT NOT NULL,
    full_path TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    depth INTEGER NOT NULL,
    is_test INTEGER NOT NULL DEFAULT 0,
    UNIQUE (parent_id, slug)
);

CREATE TABLE IF NOT EXISTS module_members (
    definition_id INTEGER PRIMARY KEY REFERENCES definitions(id),
    module_id INTEGER NOT NULL REFERENCES modules(id)
);
CREATE INDEX IF NOT EXISTS idx_module_members_module ON module_members(module_id);

CREATE TABLE IF NOT EXISTS interactions (
    id INTEGER PRIMARY KEY,
    from_module_id INTEGER NOT NULL REFERENCES modules(id),
    to_module_id INTEGER NOT NULL REFERENCES modules(id),
    direction TEXT NOT NULL DEFAULT 'uni',
    weight INTEGER NOT NULL DEFAULT 0,
    pattern TEXT,
    semantic TEXT,
    source TEXT NOT NULL,
    confidence REAL,
    symbols TEXT,
    UNIQUE (from_module_id, to_module_id)
);
CREATE INDEX IF NOT EXISTS idx_interactions_to ON interactions(to_module_id);

CREATE TABLE IF NOT EXISTS interaction_definitions (
    id INTEGER PRIMARY KEY,
    interaction_id INTEGER NOT NULL REFERENCES interactions(id),
    from_definition_id INTEGER NOT NULL REFERENCES definitions(id),
    to_definition_id INTEGER NOT NULL REFERENCES definitions(id),
    source TEXT NOT NULL,
    UNIQUE (interaction_id, from_definition_id, to_definition_id)
);
CREATE INDEX IF NOT EXISTS idx_interaction_definitions_from
    ON interaction_definitions(from_definition_id);

CREATE TABLE IF NOT EXISTS flows (
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    entry_definition_id INTEGER REFERENCES definitions(id),
    entry_module_id INTEGER REFERENCES modules(id),
    stakeholder TEXT,
    action_type TEXT,
    target_entity TEXT,
    tier INTEGER NOT NULL DEFAULT 0,
    description TEXT
);

CREATE TABLE IF NOT EXISTS flow_steps (
    id INTEGER PRIMARY KEY,
    flow_id INTEGER NOT NULL REFERENCES flows(id),
    step_order INTEGER NOT NULL,
    interaction_id INTEGER NOT NULL REFERENCES interactions(id)
);
CREATE INDEX IF NOT EXISTS idx_flow_steps_flow ON flow_steps(flow_id);
CREATE INDEX IF NOT EXISTS idx_flow_steps_interaction ON flow_steps(interaction_id);

CREATE TABLE IF NOT EXISTS flow_definition_steps (
    id INTEGER PRIMARY KEY,
    flow_id INTEGER NOT NULL REFERENCES flows(id),
    step_order INTEGER NOT NULL,
    from_definition_id INTEGER NOT NULL REFERENCES definitions(id),
    to_definition_id INTEGER NOT NULL REFERENCES definitions(id)
);
CREATE INDEX IF NOT EXISTS idx_flow_definition_steps_flow ON flow_definition_steps(flow_id);

CREATE TABLE IF NOT EXISTS flow_subflow_steps (
    id INTEGER PRIMARY KEY,
    flow_id INTEGER NOT NULL REFERENCES flows(id),
    step_order INTEGER NOT NULL,
    subflow_id INTEGER NOT NULL REFERENCES flows(id)
);
CREATE INDEX IF NOT EXISTS idx_flow_subflow_steps_flow ON flow_subflow_steps(flow_id);

CREATE TABLE IF NOT EXISTS features (
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS feature_flows (
    feature_id INTEGER NOT NULL REFERENCES features(id),
    flow_id INTEGER NOT NULL REFERENCES flows(id),
    PRIMARY KEY (feature_id, flow_id)
);

CREATE TABLE IF NOT EXISTS call_edges (
    from_definition_id INTEGER NOT NULL REFERENCES definitions(id),
    to_definition_id INTEGER NOT NULL REFERENCES definitions(id),
    weight INTEGER NOT NULL,
    min_usage_line INTEGER NOT NULL,
    PRIMARY KEY (from_definition_id, to_definition_id)
);
CREATE INDEX IF NOT EXISTS idx_call_edges_to ON call_edges(to_definition_id);

CREATE TABLE IF NOT EXISTS sync_dirty (
    id INTEGER PRIMARY KEY,
    layer TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    reason TEXT NOT NULL,
    UNIQUE (layer, entity_id)
);
"#;

/// All tables, in an order safe for dropping.
pub const ALL_TABLES: &[&str] = &[
    "sync_dirty",
    "call_edges",
    "feature_flows",
    "features",
    "flow_subflow_steps",
    "flow_definition_steps",
    "flow_steps",
    "flows",
    "interaction_definitions",
    "interactions",
    "module_members",
    "modules",
    "relationships",
    "usages",
    "symbols",
    "file_references",
    "definitions",
    "files",
    "metadata",
];

/// Read the stored schema version, if the catalog has a metadata table.
fn stored_version(conn: &Connection) -> StoreResult<Option<u32>> {
    let has_metadata: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if has_metadata.is_none() {
        return Ok(None);
    }

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.and_then(|v| v.parse().ok()))
}

/// Ensure the schema is present and at the supported version.
///
/// Forward-only: version N upgrades to N+1 in order. A database newer than
/// this build is refused.
pub fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let current = stored_version(conn)?;

    if let Some(found) = current {
        if found > SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        if found == SCHEMA_VERSION {
            return Ok(());
        }
    }

    let from = current.unwrap_or(0);
    let tx = conn.transaction()?;
    let result = (|| -> StoreResult<()> {
        if from == 0 {
            tx.execute_batch(SCHEMA)?;
        }
        // Future versions chain here: if from <= 1 { ...alter... }
        tx.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![VERSION_KEY, SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            tx.commit()?;
            Ok(())
        }
        Err(e) => Err(StoreError::Migration {
            from,
            reason: e.to_string(),
        }),
    }
}

/// Drop every table. Used by full re-index, which recreates the schema.
pub fn drop_all(conn: &Connection) -> StoreResult<()> {
    for table in ALL_TABLES {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
    }
    Ok(())
}
