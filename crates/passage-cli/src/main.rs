//! Passage database CLI
//!
//! # Usage
//!
//! ```bash
//! passage insert --key KEY --name NAME --input chunks.json [--version V]
//! passage remove --key KEY --name NAME
//! passage search --key KEY --query q.json [-k N] [--keywords a,b] [--raw]
//! passage stats --key KEY
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/passage-db/config.toml)
//! 3. File passed with --config
//! 4. Environment variables (PASSAGE_*)
//! 5. CLI flags

use std::io;

use anyhow::Result;
use clap::Parser;

use passage_cli::{
    handle_insert, handle_remove, handle_search, handle_stats, init_logging, load_settings, Cli,
    Commands, SearchArgs,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;

    let mut out = io::stdout().lock();
    match cli.command {
        Commands::Insert {
            key,
            name,
            input,
            version,
        } => {
            handle_insert(&settings, &key, &name, &input, version, &mut out)?;
        }
        Commands::Remove { key, name, version } => {
            handle_remove(&settings, &key, &name, version, &mut out)?;
        }
        Commands::Search {
            key,
            query,
            k,
            keywords,
            min_relevance,
            content_size,
            raw,
            version,
        } => {
            let args = SearchArgs {
                query: &query,
                k,
                keywords: &keywords,
                min_relevance,
                content_size,
                raw,
            };
            handle_search(&settings, &key, &args, version, &mut out)?;
        }
        Commands::Stats { key, version } => {
            handle_stats(&settings, &key, version, &mut out)?;
        }
    }

    Ok(())
}
