//! # Aspect CLI Module
//!
//! This module implements the CLI interface for the aspect linker.
//!
//! ## Available Commands
//!
//! - `load` - Instantiate a statement document and summarize the model
//! - `elements` - List the elements of a statement document
//! - `rewrite` - Move a document to another namespace or version
//! - `import` - Persist a statement document into the database
//! - `status` - Summarize the persisted store

mod commands;

use crate::config::{AppConfig, load_config};
use aspect_core::AspectError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Aspect - statement-to-model linker
///
/// Turns subject-predicate-object statements into a typed, cross-referencing
/// aspect model and keeps it consistent under edits and namespace moves.
#[derive(Parser, Debug)]
#[command(name = "aspect")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the statement database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "file" (snapshot file) or "redb" (ACID database)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Instantiate a statement document and print a summary
    Load {
        /// Path to the JSON statement document
        #[arg(short, long)]
        file: PathBuf,

        /// File key `<namespace>:<version>:<fileName>` (inferred when omitted)
        #[arg(short = 'k', long)]
        file_key: Option<String>,
    },

    /// List the elements of a statement document
    Elements {
        /// Path to the JSON statement document
        #[arg(short, long)]
        file: PathBuf,

        /// File key `<namespace>:<version>:<fileName>` (inferred when omitted)
        #[arg(short = 'k', long)]
        file_key: Option<String>,

        /// Element kind (all, aspect, entity, abstract-entity, property,
        /// abstract-property, characteristic, unit, event, entity-value)
        #[arg(short = 't', long)]
        kind: Option<String>,
    },

    /// Move a document from one namespace to another
    Rewrite {
        /// Path to the JSON statement document
        #[arg(short, long)]
        file: PathBuf,

        /// File key `<namespace>:<version>:<fileName>` (inferred when omitted)
        #[arg(short = 'k', long)]
        file_key: Option<String>,

        /// Namespace to move, `<namespace>:<version>`
        #[arg(long)]
        from: String,

        /// Target namespace, `<namespace>:<version>`
        #[arg(long)]
        to: String,

        /// Output document path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Persist a statement document into the configured backend
    Import {
        /// Path to the JSON statement document
        #[arg(short, long)]
        file: PathBuf,

        /// File key `<namespace>:<version>:<fileName>` (inferred when omitted)
        #[arg(short = 'k', long)]
        file_key: Option<String>,
    },

    /// Summarize the persisted store
    Status,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve the configuration of a parsed command line.
pub fn settings(cli: &Cli) -> Result<Settings, AspectError> {
    let config: AppConfig = load_config(cli.config.as_deref())?
        .with_overrides(cli.database.clone(), cli.backend.as_deref())?;
    Ok(Settings {
        config,
        json_mode: cli.json_mode,
    })
}

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), AspectError> {
    let settings = settings(&cli)?;

    match cli.command {
        Some(Commands::Load { file, file_key }) => cmd_load(&settings, &file, file_key.as_deref()),
        Some(Commands::Elements {
            file,
            file_key,
            kind,
        }) => cmd_elements(&settings, &file, file_key.as_deref(), kind.as_deref()),
        Some(Commands::Rewrite {
            file,
            file_key,
            from,
            to,
            output,
        }) => cmd_rewrite(&settings, &file, file_key.as_deref(), &from, &to, &output),
        Some(Commands::Import { file, file_key }) => {
            cmd_import(&settings, &file, file_key.as_deref())
        }
        Some(Commands::Status) => cmd_status(&settings),
        None => {
            // No subcommand - show status by default
            cmd_status(&settings)
        }
    }
}
