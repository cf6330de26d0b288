use clap::{Parser, Subcommand};
use codatlas::graph::coverage_report;
use codatlas::parsing::TypeScriptParser;
use codatlas::storage::StoreHandle;
use codatlas::{IndexError, IndexStore, Settings, SyncEngine};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "codatlas")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A persistent, queryable code index with module and flow abstractions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the .codatlas directory and settings file
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Full re-index: drop and recreate the schema, then sync
    Index {
        /// Directory to index (defaults to the workspace root)
        path: Option<PathBuf>,
    },

    /// Incremental sync against the current tree
    Sync {
        /// Directory to sync (defaults to the workspace root)
        path: Option<PathBuf>,
    },

    /// Read-only integrity report: ghost rows, unresolved imports,
    /// relationship coverage
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(1);
        }
    };
    codatlas::logging::init_with_config(&settings.logging);

    match run(cli, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {suggestion}");
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli, settings: &Settings) -> Result<(), IndexError> {
    match cli.command {
        Commands::Init { force } => {
            let root = std::env::current_dir().map_err(|e| IndexError::General(e.to_string()))?;
            let path = Settings::init_config_file(&root, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }

        Commands::Index { path } => {
            let root = resolve_root(path, settings)?;
            let mut store = IndexStore::open(&settings.database_path())?;
            store.recreate().map_err(IndexError::Store)?;
            run_sync(&mut store, settings, &root)
        }

        Commands::Sync { path } => {
            let root = resolve_root(path, settings)?;
            let mut store = IndexStore::open(&settings.database_path())?;
            run_sync(&mut store, settings, &root)
        }

        Commands::Check => {
            let store = IndexStore::open(&settings.database_path())?;
            let ghosts = store.ghosts().find_ghost_rows()?;
            let unresolved = store.dependencies().unresolved_count()?;
            let coverage = coverage_report(&store)?;

            println!("files:               {}", store.files().count()?);
            println!("definitions:         {}", store.definitions().count()?);
            println!("call edges:          {}", store.graph().edge_count()?);
            println!("unresolved imports:  {unresolved}");
            println!("ghost rows:          {}", ghosts.len());
            for ghost in &ghosts {
                println!("  {} rowid {} ({})", ghost.table, ghost.rowid, ghost.broken_column);
            }
            println!(
                "relationship coverage: {} covered, {} same-module, {} orphaned, {} uncovered",
                coverage.covered.len(),
                coverage.same_module.len(),
                coverage.orphaned.len(),
                coverage.uncovered.len(),
            );
            Ok(())
        }
    }
}

fn run_sync(store: &mut IndexStore, settings: &Settings, root: &PathBuf) -> Result<(), IndexError> {
    let parser = TypeScriptParser::new();
    let mut engine = SyncEngine::new(store, &parser, settings);
    let result = engine.sync(root)?;

    if result.is_noop() {
        println!("Up to date.");
    } else {
        println!(
            "Synced: +{} ~{} -{} files, +{} ~{} -{} definitions, {} references, {} call edges",
            result.files_added,
            result.files_modified,
            result.files_deleted,
            result.definitions_added,
            result.definitions_updated,
            result.definitions_removed,
            result.references_rebuilt,
            result.call_edges,
        );
    }
    for warning in &result.warnings {
        eprintln!("warning: {}: {}", warning.path.display(), warning.reason);
    }
    Ok(())
}

fn resolve_root(path: Option<PathBuf>, settings: &Settings) -> Result<PathBuf, IndexError> {
    if let Some(path) = path {
        return path.canonicalize().map_err(|e| IndexError::FileRead {
            path: path.clone(),
            source: e,
        });
    }
    if let Some(root) = &settings.workspace_root {
        return Ok(root.clone());
    }
    std::env::current_dir().map_err(|e| IndexError::General(e.to_string()))
}
