//! Command implementations for the passage CLI.
//!
//! Handlers take loaded settings and write JSON to the given writer.
//! Mutating commands flush their snapshot before returning.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use passage_db::{DatabaseFactory, PersistenceMode, VectorDatabase};
use passage_store::SnapshotFiles;
use passage_types::Settings;
use serde::Serialize;
use tracing::{debug, info};

use crate::input::{read_query, ChunkFile};

/// Load layered settings and apply CLI overrides.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over settings.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Explicit version, else the newest snapshot on disk, else 1.
pub fn resolve_version(settings: &Settings, key: &str, version: Option<u64>) -> Result<u64> {
    if let Some(version) = version {
        return Ok(version);
    }
    let files = SnapshotFiles::new(settings.expanded_base_folder(), key);
    let latest = files
        .latest_version()
        .context("Failed to scan snapshot directory")?;
    debug!(key, ?latest, "Resolved snapshot version");
    Ok(latest.unwrap_or(1))
}

fn open_database(settings: &Settings, key: &str, version: Option<u64>) -> Result<VectorDatabase> {
    let version = resolve_version(settings, key, version)?;
    DatabaseFactory::from_settings(settings)
        .open_with_mode(key, PersistenceMode::Versioned { version })
        .with_context(|| format!("Failed to open database '{key}'"))
}

fn write_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("Failed to encode output")?;
    writeln!(out)?;
    Ok(())
}

#[derive(Serialize)]
struct InsertReport<'a> {
    name: &'a str,
    first_label: usize,
    labels: usize,
    vectors: usize,
}

/// Insert a chunked document read from `input`.
pub fn handle_insert(
    settings: &Settings,
    key: &str,
    name: &str,
    input: &Path,
    version: Option<u64>,
    out: &mut impl Write,
) -> Result<()> {
    let (content, spans, vectors) = ChunkFile::read(input)?.into_parts();
    let db = open_database(settings, key, version)?;

    let labels = db
        .insert(name, &content, spans, vectors, None)
        .with_context(|| format!("Failed to insert '{name}'"))?;
    db.flush_now().context("Failed to write snapshot")?;
    info!(key, name, labels = labels.len(), "Inserted document");

    write_json(
        out,
        &InsertReport {
            name,
            first_label: labels.start,
            labels: labels.len(),
            vectors: db.stats().vectors,
        },
    )
}

#[derive(Serialize)]
struct RemoveReport<'a> {
    name: &'a str,
    removed: usize,
    vectors: usize,
}

/// Remove every document named `name`.
pub fn handle_remove(
    settings: &Settings,
    key: &str,
    name: &str,
    version: Option<u64>,
    out: &mut impl Write,
) -> Result<()> {
    let db = open_database(settings, key, version)?;
    let removed = db
        .remove(name, None)
        .with_context(|| format!("Failed to remove '{name}'"))?;
    if removed > 0 {
        db.flush_now().context("Failed to write snapshot")?;
    }

    write_json(
        out,
        &RemoveReport {
            name,
            removed,
            vectors: db.stats().vectors,
        },
    )
}

/// Search options as given on the command line.
#[derive(Debug, Clone)]
pub struct SearchArgs<'a> {
    pub query: &'a Path,
    pub k: usize,
    pub keywords: &'a [String],
    pub min_relevance: f32,
    pub content_size: usize,
    pub raw: bool,
}

/// Run a clustered (or raw per-chunk) search and print the passages.
pub fn handle_search(
    settings: &Settings,
    key: &str,
    args: &SearchArgs<'_>,
    version: Option<u64>,
    out: &mut impl Write,
) -> Result<()> {
    let query = read_query(args.query)?;
    let db = open_database(settings, key, version)?;

    let results = if args.raw {
        db.search_chunks(&query, args.k, args.min_relevance, args.content_size)
    } else {
        db.search(
            args.keywords,
            &query,
            args.k,
            args.min_relevance,
            args.content_size,
        )
    };
    let results = results.context("Search failed")?;

    write_json(out, &results)
}

/// Print statistics and the document listing.
pub fn handle_stats(
    settings: &Settings,
    key: &str,
    version: Option<u64>,
    out: &mut impl Write,
) -> Result<()> {
    let db = open_database(settings, key, version)?;
    write_json(
        out,
        &serde_json::json!({
            "stats": db.stats(),
            "documents": db.documents(),
        }),
    )
}
