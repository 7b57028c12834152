//! confsync CLI
//!
//! Operator tools for confsync clients and servers.
//!
//! # Commands
//!
//! - `cache inspect` - Display a durable cache file
//! - `cache convert` - Rewrite a durable cache file in another format
//! - `diff` - Compare two key-value JSON documents
//! - `version next` - Print the version label that follows another

mod commands;

use clap::{Parser, Subcommand};
use confsync_client::CacheFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// confsync command-line tools.
#[derive(Parser)]
#[command(name = "confsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with durable client cache files
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Compare two key-value JSON documents
    Diff {
        /// Left document
        left: PathBuf,

        /// Right document
        right: PathBuf,

        /// Show unchanged keys too
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Version labels
    Version {
        #[command(subcommand)]
        command: Option<VersionCommands>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Display a cache file's metadata and keys
    Inspect {
        /// Cache file
        file: PathBuf,

        /// Cache format (json, nested, properties, cbor); inferred if omitted
        #[arg(short, long)]
        format: Option<CacheFormat>,

        /// List every key and value
        #[arg(short, long)]
        keys: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Rewrite a cache file in another format
    Convert {
        /// Source file
        from: PathBuf,

        /// Destination file
        to: PathBuf,

        /// Source format; inferred if omitted
        #[arg(long)]
        from_format: Option<CacheFormat>,

        /// Destination format; inferred if omitted
        #[arg(long)]
        to_format: Option<CacheFormat>,
    },
}

#[derive(Subcommand)]
enum VersionCommands {
    /// Print the label that follows `latest` (or the first label)
    Next {
        /// Latest existing label
        latest: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Cache { command } => match command {
            CacheCommands::Inspect {
                file,
                format,
                keys,
                output,
            } => commands::cache::inspect(&file, format, keys, &output)?,
            CacheCommands::Convert {
                from,
                to,
                from_format,
                to_format,
            } => {
                commands::cache::convert(&from, &to, from_format, to_format)?;
            }
        },
        Commands::Diff {
            left,
            right,
            all,
            output,
        } => commands::diff::run(&left, &right, all, &output)?,
        Commands::Version { command } => match command {
            Some(VersionCommands::Next { latest }) => commands::version::next(latest.as_deref()),
            None => {
                println!("confsync CLI v{}", env!("CARGO_PKG_VERSION"));
            }
        },
    }

    Ok(())
}
