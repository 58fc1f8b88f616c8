//! Passage CLI library.
//!
//! Exposes argument parsing, input file readers and command handlers so
//! they can be tested without spawning the binary.

pub mod cli;
pub mod commands;
pub mod input;

pub use cli::{Cli, Commands};
pub use commands::{
    handle_insert, handle_remove, handle_search, handle_stats, init_logging, load_settings,
    resolve_version, SearchArgs,
};
pub use input::{read_query, ChunkFile, ChunkRecord};
