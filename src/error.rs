//! Error types for the code index.
//!
//! Structured errors via thiserror, one enum per family. Recoverable
//! conditions (parse failures, unresolved imports) are represented in-band
//! by the callers; these enums cover the fatal paths.

use crate::FileId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for index and sync operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to walk directory '{path}': {reason}")]
    WalkFailed { path: PathBuf, reason: String },

    #[error("Failed to parse {language} file '{path}': {reason}")]
    ParseFailed {
        path: PathBuf,
        language: String,
        reason: String,
    },

    #[error("File ID {id:?} not found in index. The file may have been removed or never synced.")]
    FileNotFound { id: FileId },

    #[error("File '{path}' is outside the indexed root '{root}'")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    General(String),
}

/// Errors raised by the index store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to open database at '{path}': {reason}")]
    Open { path: PathBuf, reason: String },

    #[error(
        "Schema migration from version {from} failed: {reason}. The store was left unchanged."
    )]
    Migration { from: u32, reason: String },

    #[error(
        "Store schema version {found} is newer than supported version {supported}. \
         Upgrade codatlas or re-run 'codatlas index' to rebuild."
    )]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("Could not acquire exclusive write transaction after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("Row in '{table}' references a missing {referenced}: {detail}")]
    BrokenReference {
        table: &'static str,
        referenced: &'static str,
        detail: String,
    },

    #[error("ID overflow in table '{table}': rowid {rowid} exceeds the dense ID range")]
    IdOverflow { table: &'static str, rowid: i64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the bundled parser.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to initialize {language} grammar: {reason}")]
    GrammarInit { language: String, reason: String },

    #[error("Parser produced no tree for '{path}'")]
    NoTree { path: PathBuf },

    #[error("Invalid UTF-8 in source file '{path}'")]
    InvalidUtf8 { path: PathBuf },
}

impl IndexError {
    /// Actionable suggestions for the operator, printed by the CLI on fatal
    /// errors.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Store(StoreError::Migration { .. }) => vec![
                "Run 'codatlas index' to drop and recreate the schema",
                "Check disk space and permissions on the database file",
            ],
            Self::Store(StoreError::SchemaTooNew { .. }) => vec![
                "This database was written by a newer codatlas",
                "Run 'codatlas index' to rebuild it at this version",
            ],
            Self::Store(StoreError::Busy { .. }) => vec![
                "Another process holds the write lock on the database",
                "Stop concurrent sync invocations and retry",
            ],
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
            ],
            Self::Config { .. } => vec![
                "Run 'codatlas init' to write a fresh settings file",
            ],
            _ => vec![],
        }
    }

    /// Exit code mapping for the CLI: 1 user error, 2 I/O or store error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::OutsideRoot { .. } => 1,
            _ => 2,
        }
    }
}

/// Result alias for index and sync operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let user = IndexError::Config {
            reason: "bad".into(),
        };
        assert_eq!(user.exit_code(), 1);

        let io = IndexError::FileRead {
            path: PathBuf::from("x.ts"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(io.exit_code(), 2);
    }

    #[test]
    fn test_migration_error_has_suggestions() {
        let err = IndexError::Store(StoreError::Migration {
            from: 1,
            reason: "boom".into(),
        });
        assert!(!err.recovery_suggestions().is_empty());
    }
}
