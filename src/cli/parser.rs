//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::facts::DEFAULT_DB_PATH;
use crate::service::CacheTier;

/// pvkg: grounded question answering over a photovoltaics fact base.
///
/// Answers questions from a local fact base through a text-generation
/// service, with a persistent answer cache and per-answer provenance.
#[derive(Parser, Debug)]
#[command(name = "pvkg")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the fact base database file.
    ///
    /// Defaults to `.pvkg/facts.db` in the current directory.
    #[arg(short, long, env = "PVKG_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Directory holding the answer and reasoning cache files.
    #[arg(long, env = "PVKG_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fact base operations (import, stats, search, entity).
    #[command(subcommand)]
    Facts(FactsCommands),

    /// Answer a question in one grounded model call.
    ///
    /// Builds a retrieval context from the fact base, then asks the model
    /// to answer from that context only. Answers are cached.
    #[command(after_help = r#"Examples:
  pvkg ask "What is the bandgap of MAPbI3?"
  pvkg ask "Which defects affect Voc?" --context-only
  pvkg --format json ask "Compare PERC and tandem efficiency"
"#)]
    Ask {
        /// The question.
        query: String,

        /// Print the retrieval context instead of calling the model.
        #[arg(long)]
        context_only: bool,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,
    },

    /// Answer a question with the multi-step reasoning agent.
    ///
    /// The model calls fact-base tools until it can answer. Prints the
    /// answer followed by its provenance record.
    #[command(after_help = r#"Examples:
  pvkg reason "Which absorbers suit a tandem top cell?"
  pvkg reason "How do iodide vacancies hurt performance?" --trace
  pvkg reason "List defects" --max-iterations 3
"#)]
    Reason {
        /// The question.
        query: String,

        /// Show each tool invocation.
        #[arg(long)]
        trace: bool,

        /// Maximum model calls for this session.
        #[arg(long, env = "PVKG_MAX_ITERATIONS")]
        max_iterations: Option<usize>,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,
    },

    /// Cache operations (stats, clear).
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Write the default prompt templates to a directory.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  pvkg init-prompts                    # ~/.config/pvkg/prompts
  pvkg init-prompts --dir ./prompts
"#)]
    InitPrompts {
        /// Target directory.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Start MCP (Model Context Protocol) server.
    #[cfg(feature = "mcp")]
    #[command(subcommand)]
    Mcp(McpCommands),
}

/// Fact base subcommands.
#[derive(Subcommand, Debug)]
pub enum FactsCommands {
    /// Import a JSON seed into the fact base.
    #[command(after_help = r#"Examples:
  pvkg facts import data/pv_seed.json
  pvkg facts import data/pv_seed.json --force   # replace existing facts
"#)]
    Import {
        /// Seed file (`{entities: [...], relations: [...]}`).
        seed: PathBuf,

        /// Replace existing facts.
        #[arg(short, long)]
        force: bool,
    },

    /// Show fact counts.
    Stats,

    /// Find entities whose name or description contains a keyword.
    Search {
        /// Keyword (case-insensitive).
        keyword: String,
    },

    /// Show an entity's attributes and relations.
    Entity {
        /// Exact entity name.
        name: String,
    },
}

/// Cache subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache counters.
    Stats,

    /// Clear cached results.
    #[command(after_help = r#"Examples:
  pvkg cache clear                     # every tier
  pvkg cache clear --tier reasoning
"#)]
    Clear {
        /// Tier to clear.
        #[arg(long, value_enum, default_value_t = CacheTier::All)]
        tier: CacheTier,
    },
}

/// MCP server subcommands.
#[cfg(feature = "mcp")]
#[derive(Subcommand, Debug)]
pub enum McpCommands {
    /// Start MCP server with stdio transport.
    ///
    /// Reads JSON-RPC messages from stdin, writes responses to stdout.
    #[command(after_help = r#"Examples:
  pvkg mcp stdio
  GROQ_API_KEY=gsk-... pvkg mcp stdio
"#)]
    Stdio,

    /// Start MCP server with streamable HTTP transport.
    #[command(after_help = r#"Examples:
  pvkg mcp serve                            # Listen on 127.0.0.1:3000
  pvkg mcp serve --host 0.0.0.0 --port 8080
"#)]
    Serve {
        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to.
        #[arg(long, default_value = "3000")]
        port: u16,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}
