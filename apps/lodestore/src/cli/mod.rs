//! # Lodestore CLI Module
//!
//! This module implements the CLI interface for Lodestore.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new store
//! - `status` - Show store status
//! - `types` - List the stored type dictionary
//! - `check` - Validate every record and report unreachable ones
//! - `export-dictionary` - Write the type dictionary to a file
//! - `import-dictionary` - Merge a dictionary file into the store
//! - `suggest` - Suggest member mappings between two dictionary files

mod commands;

use clap::{Parser, Subcommand};
use lodestore_core::LodestoreError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Lodestore - embedded object-graph persistence
///
/// Inspects entity stores and plans schema refactorings.
#[derive(Parser, Debug)]
#[command(name = "lodestore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the entity store
    #[arg(short = 'D', long, global = true, default_value = "lodestore.redb")]
    pub database: PathBuf,

    /// Path to the refactoring configuration
    #[arg(short, long, global = true, default_value = "lodestore.toml")]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty store
    Init {
        /// Force initialization even if the store exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show store status
    Status,

    /// List stored types and their layouts
    Types,

    /// Validate records and reachability from the roots
    Check,

    /// Export the type dictionary
    ExportDictionary {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge a dictionary file into the store
    ImportDictionary {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Suggest member mappings from a legacy dictionary to a current one
    Suggest {
        /// Legacy dictionary file
        #[arg(long)]
        from: PathBuf,

        /// Current dictionary file
        #[arg(long)]
        to: PathBuf,

        /// Only map the legacy type with this name
        #[arg(short = 't', long)]
        type_name: Option<String>,

        /// Minimum similarity score (overrides the configuration)
        #[arg(long)]
        threshold: Option<f64>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), LodestoreError> {
    let json_mode = cli.json;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&cli.database, force),
        Some(Commands::Status) => cmd_status(&cli.database, json_mode),
        Some(Commands::Types) => cmd_types(&cli.database, json_mode),
        Some(Commands::Check) => cmd_check(&cli.database, json_mode),
        Some(Commands::ExportDictionary { output }) => {
            cmd_export_dictionary(&cli.database, &output)
        }
        Some(Commands::ImportDictionary { input }) => {
            cmd_import_dictionary(&cli.database, &input)
        }
        Some(Commands::Suggest {
            from,
            to,
            type_name,
            threshold,
        }) => cmd_suggest(
            &cli.config,
            &from,
            &to,
            type_name.as_deref(),
            threshold,
            json_mode,
        ),
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.database, json_mode)
        }
    }
}
