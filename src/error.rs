//! Error types for pvkg.
//!
//! Each layer has its own error enum. Only [`AgentError`] variants that
//! describe transport or configuration failures ever reach a caller; tool
//! and cache errors are contained by the agents.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by the CLI layer.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Agent or text-generation failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Fact base failure.
    #[error(transparent)]
    Fact(#[from] FactError),

    /// Persistent cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Raw I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the agents and the text-generation client.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No credential for the text-generation service was configured.
    #[error(
        "no API key configured for the language model (set GROQ_API_KEY, OPENAI_API_KEY or PVKG_API_KEY)"
    )]
    ApiKeyMissing,

    /// The configured provider name is not known.
    #[error("unsupported language model provider: {name}")]
    UnsupportedProvider {
        /// Provider name from configuration.
        name: String,
    },

    /// The text-generation service could not be reached or rejected the call.
    #[error("language model request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// A model call did not complete in time.
    #[error("language model did not respond within {seconds}s")]
    Timeout {
        /// Configured limit in seconds.
        seconds: u64,
    },

    /// Tool arguments could not be parsed.
    #[error("invalid arguments for tool '{name}': {message}")]
    MalformedToolArguments {
        /// Tool name.
        name: String,
        /// Parse error.
        message: String,
    },

    /// The model requested a tool that is not declared.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// Requested tool name.
        name: String,
    },

    /// A declared tool failed while running against the fact base.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// The query was rejected before any work was done.
    #[error("{message}")]
    InvalidQuery {
        /// Reason for rejection.
        message: String,
    },
}

/// Errors raised by a fact base implementation.
#[derive(Debug, Error)]
pub enum FactError {
    /// Underlying `SQLite` failure.
    #[error("fact base query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A raw query tried to modify the fact base.
    #[error("only read-only queries are allowed against the fact base")]
    NotReadOnly,

    /// The fact base has not been populated.
    #[error("fact base at {} is not initialized; run `pvkg facts import` first", path.display())]
    NotInitialized {
        /// Database path.
        path: PathBuf,
    },

    /// A seed file could not be read or applied.
    #[error("invalid fact seed: {message}")]
    Seed {
        /// Description of the problem.
        message: String,
    },
}

/// Errors raised by the persistent cache tier.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the cache file failed.
    #[error("cache file {} could not be written: {source}", path.display())]
    Io {
        /// Cache file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The cache map could not be serialized.
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command could not complete.
    #[error("{0}")]
    ExecutionFailed(String),

    /// An argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
