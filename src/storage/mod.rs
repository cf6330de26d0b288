//! The index store: durable storage and query over SQLite.
//!
//! One database file per indexed repository, write-ahead logging enabled.
//! Repositories group CRUD and query aggregates by entity family; each
//! borrows a plain `&Connection`, so the same code paths serve autocommit
//! reads and the exclusive sync transaction (`rusqlite::Transaction`
//! derefs to `Connection`).
//!
//! Concurrency model: one writer at a time holding an exclusive
//! transaction for the duration of a sync; readers proceed through the WAL.

mod definitions;
mod dependencies;
mod features;
mod files;
mod flows;
mod ghost;
mod graph;
mod interactions;
mod metadata;
mod modules;
mod relationships;
mod schema;
mod sync_dirty;

pub use definitions::{DefinitionRecord, DefinitionRepo};
pub use dependencies::{DependencyRepo, ReferenceRecord, SymbolRecord, UsageRecord};
pub use features::{FeatureRecord, FeatureRepo};
pub use files::{FileRecord, FileRepo};
pub use flows::{FlowRecord, FlowRepo, FlowStepRecord, NewFlow};
pub use ghost::{GhostRepo, GhostRow};
pub use graph::{CallEdge, GraphRepo};
pub use interactions::{InteractionDefinitionLink, InteractionRecord, InteractionRepo};
pub use metadata::MetadataRepo;
pub use modules::{ModuleRecord, ModuleRepo};
pub use relationships::{RelationshipRecord, RelationshipRepo, PENDING_ANNOTATION};
pub use schema::SCHEMA_VERSION;
pub use sync_dirty::{DirtyEntry, SyncDirtyRepo};

use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts to acquire the exclusive write transaction before giving up.
const BUSY_ATTEMPTS: u32 = 5;

/// Initial backoff between acquisition attempts; doubles each retry.
const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// SQLite's parameter ceiling is 999; batched `IN (...)` queries chunk
/// below it.
pub(crate) const PARAM_CHUNK: usize = 500;

/// Render `?1, ?2, ...` for an `IN` clause of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 3);
    for i in 1..=n {
        if i > 1 {
            out.push_str(", ");
        }
        out.push('?');
        out.push_str(&i.to_string());
    }
    out
}

/// Anything that can hand out repositories: the store itself or an open
/// transaction on it.
pub trait StoreHandle {
    fn raw(&self) -> &Connection;

    fn metadata(&self) -> MetadataRepo<'_> {
        MetadataRepo::new(self.raw())
    }
    fn files(&self) -> FileRepo<'_> {
        FileRepo::new(self.raw())
    }
    fn definitions(&self) -> DefinitionRepo<'_> {
        DefinitionRepo::new(self.raw())
    }
    fn dependencies(&self) -> DependencyRepo<'_> {
        DependencyRepo::new(self.raw())
    }
    fn relationships(&self) -> RelationshipRepo<'_> {
        RelationshipRepo::new(self.raw())
    }
    fn modules(&self) -> ModuleRepo<'_> {
        ModuleRepo::new(self.raw())
    }
    fn interactions(&self) -> InteractionRepo<'_> {
        InteractionRepo::new(self.raw())
    }
    fn flows(&self) -> FlowRepo<'_> {
        FlowRepo::new(self.raw())
    }
    fn features(&self) -> FeatureRepo<'_> {
        FeatureRepo::new(self.raw())
    }
    fn sync_dirty(&self) -> SyncDirtyRepo<'_> {
        SyncDirtyRepo::new(self.raw())
    }
    fn graph(&self) -> GraphRepo<'_> {
        GraphRepo::new(self.raw())
    }
    fn ghosts(&self) -> GhostRepo<'_> {
        GhostRepo::new(self.raw())
    }
}

/// Handle on one index database.
pub struct IndexStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl IndexStore {
    /// Open (creating if needed) the database at `path`, enable WAL, and
    /// ensure the schema is current. A failed migration leaves the store
    /// unchanged and is fatal.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Drop and recreate the schema. Backs the `index` subcommand's full
    /// re-index.
    pub fn recreate(&mut self) -> StoreResult<()> {
        schema::drop_all(&self.conn)?;
        schema::migrate(&mut self.conn)
    }

    /// Open the single exclusive write transaction for a sync invocation.
    ///
    /// Another writer holding the lock is retried with exponential backoff
    /// a small number of times, then surfaces as [`StoreError::Busy`].
    pub fn begin_sync(&mut self) -> StoreResult<StoreTransaction<'_>> {
        let mut backoff = BUSY_BACKOFF;
        for attempt in 1..=BUSY_ATTEMPTS {
            match self.conn.execute_batch("BEGIN IMMEDIATE") {
                Ok(()) => {
                    return Ok(StoreTransaction {
                        conn: &self.conn,
                        done: false,
                    });
                }
                Err(e) if is_busy(&e) && attempt < BUSY_ATTEMPTS => {
                    warn!(attempt, "database busy, retrying in {backoff:?}");
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(e) if is_busy(&e) => {
                    return Err(StoreError::Busy {
                        attempts: BUSY_ATTEMPTS,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Busy {
            attempts: BUSY_ATTEMPTS,
        })
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

impl StoreHandle for IndexStore {
    fn raw(&self) -> &Connection {
        &self.conn
    }
}

/// The exclusive write transaction of one sync invocation.
///
/// Dropping without [`commit`](Self::commit) rolls back everything, which
/// is exactly the crash semantics the pipeline wants.
pub struct StoreTransaction<'c> {
    conn: &'c Connection,
    done: bool,
}

impl StoreTransaction<'_> {
    pub fn commit(mut self) -> StoreResult<()> {
        debug!("committing sync transaction");
        self.conn.execute_batch("COMMIT")?;
        self.done = true;
        Ok(())
    }
}

impl Drop for StoreTransaction<'_> {
    fn drop(&mut self) {
        if !self.done {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("failed to roll back sync transaction: {e}");
            }
        }
    }
}

impl StoreHandle for StoreTransaction<'_> {
    fn raw(&self) -> &Connection {
        self.conn
    }
}
