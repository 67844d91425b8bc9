//! logspool CLI
//!
//! Offline tools for journal directories. Every command opens segment files
//! read-only and takes no lock, so they can be pointed at the journal of a
//! running process.
//!
//! # Commands
//!
//! - `show` - Display segments, offsets and the committed read offset
//! - `decode` - Print journal entries starting at an offset
//! - `verify` - Check every record checksum and the offset indexes

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// logspool journal tools.
#[derive(Parser)]
#[command(name = "logspool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display segments, offsets and the committed read offset
    Show {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print journal entries
    Decode {
        /// First journal offset to print
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print payloads as hex instead of text
        #[arg(long)]
        hex: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify record checksums and offset indexes
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Show { format } => {
            let path = cli.path.ok_or("Journal path required for show")?;
            commands::show::run(&path, &format)?;
        }
        Commands::Decode {
            offset,
            limit,
            hex,
            format,
        } => {
            let path = cli.path.ok_or("Journal path required for decode")?;
            commands::decode::run(&path, offset, limit, hex, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Journal path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("logspool CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
