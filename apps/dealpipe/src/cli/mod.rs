//! # dealpipe CLI Module
//!
//! This module implements the CLI interface for dealpipe.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `status` - Show pipeline counts
//! - `stages` - List pipeline stages
//! - `stage-add` - Create a stage as the local administrator
//! - `deals` - List deals

mod commands;

use clap::{Parser, Subcommand};
use dealpipe::AppError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// dealpipe - Deal Pipeline Server
///
/// Tracks real-estate deals through an ordered, access-controlled pipeline.
#[derive(Parser, Debug)]
#[command(name = "dealpipe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the pipeline database
    #[arg(short = 'D', long, global = true, default_value = "dealpipe.redb")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "memory" (volatile)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

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
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Sessions file (falls back to DEALPIPE_SESSIONS)
        #[arg(short, long)]
        sessions: Option<PathBuf>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show pipeline counts
    Status,

    /// List pipeline stages in order
    Stages {
        /// Include inactive stages
        #[arg(short, long)]
        all: bool,
    },

    /// Create a stage
    StageAdd {
        /// Stage name
        #[arg(short, long)]
        name: String,

        /// Explicit order index (appends when omitted)
        #[arg(short, long)]
        order: Option<i64>,

        /// Create the stage inactive
        #[arg(long)]
        inactive: bool,
    },

    /// List deals, most recently updated first
    Deals {
        /// Only deals in this stage
        #[arg(short, long)]
        stage: Option<u64>,

        /// Only deals whose stage is inactive
        #[arg(long)]
        orphaned: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server {
            host,
            port,
            sessions,
        }) => cmd_server(&cli.database, backend, &host, port, sessions).await,
        Some(Commands::Init { force }) => cmd_init(&cli.database, backend, force),
        Some(Commands::Status) => cmd_status(&cli.database, backend, json_mode),
        Some(Commands::Stages { all }) => cmd_stages(&cli.database, backend, json_mode, all),
        Some(Commands::StageAdd {
            name,
            order,
            inactive,
        }) => cmd_stage_add(&cli.database, backend, json_mode, name, order, inactive),
        Some(Commands::Deals { stage, orphaned }) => {
            cmd_deals(&cli.database, backend, json_mode, stage, orphaned)
        }
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.database, backend, json_mode)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
