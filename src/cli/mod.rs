//! CLI layer for pvkg.
//!
//! Provides the command-line interface using clap, with commands for
//! loading the fact base, asking questions and managing caches.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
#[cfg(feature = "mcp")]
pub use parser::McpCommands;
pub use parser::{CacheCommands, Cli, Commands, FactsCommands};
