//! Layered configuration for the index.
//!
//! Sources, lowest to highest precedence:
//! - built-in defaults
//! - `.codatlas/settings.toml` found by ancestor search
//! - environment variables prefixed with `CODATLAS_`
//!
//! Nested keys use double underscores in the environment:
//! `CODATLAS_INDEXING__PARALLEL_THREADS=8` sets `indexing.parallel_threads`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name of the per-repository state directory.
pub const STATE_DIR: &str = ".codatlas";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path of the index database, relative to the workspace root.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Workspace root; filled in at load time, never read from file.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Workspace alias prefix -> root-relative directory, used by the
    /// parser to resolve non-relative imports.
    #[serde(default)]
    pub workspace_aliases: HashMap<String, PathBuf>,

    #[serde(default)]
    pub flows: FlowConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Number of parallel threads for the parse phase.
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Glob patterns excluded from the walk, on top of gitignore rules.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// File extensions considered source files.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Depth limit when following re-export chains.
    #[serde(default = "default_reexport_depth")]
    pub reexport_depth: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FlowConfig {
    /// Overlap ratio at or above which two flows are dedup candidates.
    #[serde(default = "default_overlap_threshold")]
    pub dedup_overlap_threshold: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `sync = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_db_path() -> PathBuf {
    PathBuf::from(STATE_DIR).join("index.db")
}
fn default_parallel_threads() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}
fn default_ignore_patterns() -> Vec<String> {
    vec![
        "node_modules/**".to_string(),
        "dist/**".to_string(),
        "build/**".to_string(),
        "coverage/**".to_string(),
        "*.generated.*".to_string(),
    ]
}
fn default_extensions() -> Vec<String> {
    vec![
        "ts".to_string(),
        "tsx".to_string(),
        "js".to_string(),
        "jsx".to_string(),
    ]
}
fn default_reexport_depth() -> usize {
    5
}
fn default_overlap_threshold() -> f64 {
    0.7
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            db_path: default_db_path(),
            workspace_root: None,
            indexing: IndexingConfig::default(),
            workspace_aliases: HashMap::new(),
            flows: FlowConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            ignore_patterns: default_ignore_patterns(),
            extensions: default_extensions(),
            reexport_depth: default_reexport_depth(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            dedup_overlap_threshold: default_overlap_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, anchored at the nearest
    /// ancestor containing a `.codatlas` directory.
    pub fn load() -> Result<Self, figment::Error> {
        let root = Self::find_workspace_root();
        let config_path = root
            .as_deref()
            .map(|r| r.join(STATE_DIR).join("settings.toml"))
            .unwrap_or_else(|| PathBuf::from(STATE_DIR).join("settings.toml"));

        let mut settings: Settings = Self::figment(&config_path).extract()?;
        settings.workspace_root = root;
        Ok(settings)
    }

    /// Load configuration from a specific file (tests, --config flag).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("CODATLAS_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Walk ancestors looking for the state directory.
    fn find_workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|dir| dir.join(STATE_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Absolute path of the database file.
    pub fn database_path(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) => root.join(&self.db_path),
            None => self.db_path.clone(),
        }
    }

    /// Write the default settings file under `root/.codatlas/`.
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, crate::IndexError> {
        let config_path = root.join(STATE_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err(crate::IndexError::Config {
                reason: format!(
                    "'{}' already exists. Use --force to overwrite.",
                    config_path.display()
                ),
            });
        }

        std::fs::create_dir_all(config_path.parent().unwrap()).map_err(|e| {
            crate::IndexError::FileWrite {
                path: config_path.clone(),
                source: e,
            }
        })?;

        let rendered = toml::to_string_pretty(&Settings::default()).map_err(|e| {
            crate::IndexError::Config {
                reason: format!("failed to render default settings: {e}"),
            }
        })?;
        std::fs::write(&config_path, rendered).map_err(|e| crate::IndexError::FileWrite {
            path: config_path.clone(),
            source: e,
        })?;

        Ok(config_path)
    }
}
