//! CLI argument parsing for the passage tool.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Passage database CLI
///
/// Insert chunked documents, remove them, and run clustered searches
/// against snapshots on disk.
#[derive(Parser, Debug)]
#[command(name = "passage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/passage-db/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Database commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert a chunked document from a JSON file
    Insert {
        /// Database key
        #[arg(long)]
        key: String,

        /// Document name (removal key)
        #[arg(long)]
        name: String,

        /// JSON file with `content` and `chunks` (startOffset, length, vector)
        #[arg(short, long)]
        input: PathBuf,

        /// Snapshot version (default: newest on disk, or 1)
        #[arg(long)]
        version: Option<u64>,
    },

    /// Remove every document with a name
    Remove {
        /// Database key
        #[arg(long)]
        key: String,

        /// Document name
        #[arg(long)]
        name: String,

        /// Snapshot version (default: newest on disk, or 1)
        #[arg(long)]
        version: Option<u64>,
    },

    /// Search with a query vector from a JSON file
    Search {
        /// Database key
        #[arg(long)]
        key: String,

        /// JSON file holding the query vector
        #[arg(short, long)]
        query: PathBuf,

        /// Number of passages
        #[arg(short, default_value = "5")]
        k: usize,

        /// Comma-separated keywords for the keyword boost
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Drop raw hits scoring below this
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        min_relevance: f32,

        /// Padding around each passage (chunks, or bytes with --raw)
        #[arg(long, default_value = "0")]
        content_size: usize,

        /// Return one passage per raw hit instead of clusters
        #[arg(long)]
        raw: bool,

        /// Snapshot version (default: newest on disk, or 1)
        #[arg(long)]
        version: Option<u64>,
    },

    /// Show database statistics and documents
    Stats {
        /// Database key
        #[arg(long)]
        key: String,

        /// Snapshot version (default: newest on disk, or 1)
        #[arg(long)]
        version: Option<u64>,
    },
}
