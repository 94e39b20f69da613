//! FountDB CLI
//!
//! Command-line tools for FountDB store directories.
//!
//! # Commands
//!
//! - `inspect` - Show manifest, table and WAL statistics
//! - `verify` - Check WAL checksums and table integrity
//! - `compact` - Merge overlapping tables
//! - `dump-wal` - Print WAL records for debugging

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FountDB command-line store tools.
#[derive(Parser)]
#[command(name = "fount")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show manifest, table and WAL statistics
    Inspect {
        /// Show per-table details
        #[arg(short, long)]
        tables: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Check WAL checksums and table integrity
    Verify {
        /// Check the WAL
        #[arg(short, long)]
        wal: bool,

        /// Check tables
        #[arg(short, long)]
        tables: bool,
    },

    /// Merge overlapping tables
    Compact {
        /// Flush buffered WAL records to a table first
        #[arg(long)]
        flush: bool,

        /// Show the merge plan without changing anything
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Print WAL records for debugging
    DumpWal {
        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only print records for this collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let path = cli.path.ok_or(commands::CliError::PathRequired)?;
    match cli.command {
        Commands::Inspect { tables, format } => {
            commands::inspect::run(&path, tables, format)?;
        }
        Commands::Verify { wal, tables } => {
            let check_all = !wal && !tables;
            commands::verify::run(&path, wal || check_all, tables || check_all)?;
        }
        Commands::Compact { flush, dry_run } => {
            commands::compact::run(&path, flush, dry_run)?;
        }
        Commands::DumpWal {
            limit,
            collection,
            format,
        } => {
            commands::dump_wal::run(&path, limit, collection.as_deref(), format)?;
        }
    }

    Ok(())
}
