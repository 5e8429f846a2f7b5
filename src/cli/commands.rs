//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::agent::client::create_provider;
use crate::agent::config::{AgentConfig, AgentConfigBuilder};
use crate::agent::context::build_context;
use crate::agent::prompt::PromptSet;
use crate::cli::output::{
    OutputFormat, format_cache_stats, format_entities, format_entity_details, format_reasoned,
    format_summary,
};
#[cfg(feature = "mcp")]
use crate::cli::parser::McpCommands;
use crate::cli::parser::{CacheCommands, Cli, Commands, FactsCommands};
use crate::error::{CommandError, FactError, Result};
use crate::facts::{FactQuery, FactSeed, SqliteFactStore};
use crate::service::{CacheTier, KnowledgeService, ServiceCaches};

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Facts(sub) => execute_facts(sub, &db_path, format),
        Commands::Ask {
            query,
            context_only,
            prompt_dir,
        } => {
            if *context_only {
                cmd_context(cli, &db_path, query, format)
            } else {
                cmd_ask(cli, &db_path, query, prompt_dir.as_deref(), format)
            }
        }
        Commands::Reason {
            query,
            trace,
            max_iterations,
            prompt_dir,
        } => {
            let mut builder = config_builder(cli);
            if let Some(n) = max_iterations {
                builder = builder.max_iterations(*n);
            }
            if let Some(dir) = prompt_dir {
                builder = builder.prompt_dir(dir);
            }
            cmd_reason(builder, &db_path, query, *trace, format)
        }
        Commands::Cache(sub) => execute_cache(sub, cli, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
        #[cfg(feature = "mcp")]
        Commands::Mcp(cmd) => cmd_mcp(cmd, cli, &db_path),
    }
}

fn execute_facts(cmd: &FactsCommands, db_path: &Path, format: OutputFormat) -> Result<String> {
    match cmd {
        FactsCommands::Import { seed, force } => cmd_import(db_path, seed, *force, format),
        FactsCommands::Stats => {
            let store = open_facts(db_path)?;
            Ok(format_summary(&store.summary()?, format))
        }
        FactsCommands::Search { keyword } => {
            let store = open_facts(db_path)?;
            Ok(format_entities(&store.search_by_keyword(keyword)?, format))
        }
        FactsCommands::Entity { name } => {
            let store = open_facts(db_path)?;
            let details = store.entity_details(name)?;
            if details.is_empty() {
                return Err(
                    CommandError::InvalidArgument(format!("no entity named '{name}'")).into(),
                );
            }
            Ok(format_entity_details(name, &details, format))
        }
    }
}

fn execute_cache(cmd: &CacheCommands, cli: &Cli, format: OutputFormat) -> Result<String> {
    // Cache administration needs no credentials.
    let config = config_builder(cli).build_unauthenticated();
    let caches = ServiceCaches::open(&config.cache);

    match cmd {
        CacheCommands::Stats => Ok(format_cache_stats(
            &caches.stats(config.max_iterations),
            format,
        )),
        CacheCommands::Clear { tier } => {
            let removed = caches.clear(*tier)?;
            Ok(format_cleared(*tier, removed, format))
        }
    }
}

/// Opens the fact base and ensures it holds facts.
fn open_facts(db_path: &Path) -> Result<SqliteFactStore> {
    SqliteFactStore::open_existing(db_path).map_err(|e| match e {
        FactError::NotInitialized { .. } => CommandError::ExecutionFailed(format!(
            "fact base at {} is empty. Run `pvkg facts import <seed>` first.",
            db_path.display()
        ))
        .into(),
        other => other.into(),
    })
}

/// Environment-backed config with the global CLI overrides applied.
fn config_builder(cli: &Cli) -> AgentConfigBuilder {
    let builder = AgentConfig::builder().from_env();
    match &cli.cache_dir {
        Some(dir) => builder.cache_dir(dir),
        None => builder,
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

/// Wires the service for commands that talk to the model.
fn build_service(config: &AgentConfig, db_path: &Path) -> Result<KnowledgeService> {
    let facts: Arc<dyn FactQuery> = Arc::new(open_facts(db_path)?);
    let provider = create_provider(config)?;
    Ok(KnowledgeService::new(config, facts, provider))
}

// ==================== Command Implementations ====================

fn cmd_import(
    db_path: &Path,
    seed_path: &Path,
    force: bool,
    format: OutputFormat,
) -> Result<String> {
    let seed = FactSeed::from_path(seed_path)?;
    let store = SqliteFactStore::open(db_path)?;
    if store.is_initialized()? && !force {
        return Err(CommandError::ExecutionFailed(
            "Fact base already has facts. Use --force to replace them.".to_string(),
        )
        .into());
    }
    let summary = store.import(&seed, force)?;

    match format {
        OutputFormat::Text => Ok(format!(
            "Imported {} entities and {} relations into {}\n",
            summary.entity_count,
            summary.relation_count,
            db_path.display()
        )),
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "success": true,
            "path": db_path.to_string_lossy(),
            "force": force,
            "summary": summary,
        }))),
    }
}

fn cmd_context(cli: &Cli, db_path: &Path, query: &str, format: OutputFormat) -> Result<String> {
    crate::service::validate_query(query)?;
    let config = config_builder(cli).build_unauthenticated();
    let store = open_facts(db_path)?;
    let context = build_context(&store, query, config.overview_fallback);

    match format {
        OutputFormat::Text if context.is_empty() => {
            Ok("No context matched this query.\n".to_string())
        }
        OutputFormat::Text => Ok(context + "\n"),
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "query": query,
            "context": context,
        }))),
    }
}

fn cmd_ask(
    cli: &Cli,
    db_path: &Path,
    query: &str,
    prompt_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<String> {
    let mut builder = config_builder(cli);
    if let Some(dir) = prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder.build()?;
    let service = build_service(&config, db_path)?;

    let answer = runtime()?.block_on(service.ask(query))?;
    debug!(bytes = answer.len(), "answer ready");

    match format {
        OutputFormat::Text => Ok(answer + "\n"),
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "query": query,
            "answer": answer,
        }))),
    }
}

fn cmd_reason(
    builder: AgentConfigBuilder,
    db_path: &Path,
    query: &str,
    show_trace: bool,
    format: OutputFormat,
) -> Result<String> {
    let config = builder.build()?;
    let service = build_service(&config, db_path)?;

    let reasoned = runtime()?.block_on(service.ask_with_reasoning(query))?;
    Ok(format_reasoned(&reasoned, show_trace, format))
}

fn format_cleared(tier: CacheTier, removed: usize, format: OutputFormat) -> String {
    let tier_name = match tier {
        CacheTier::All => "all",
        CacheTier::Answers => "answers",
        CacheTier::Contexts => "contexts",
        CacheTier::Reasoning => "reasoning",
    };
    match format {
        OutputFormat::Text => format!("Cleared {removed} cache entries ({tier_name}).\n"),
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "tier": tier_name,
            "removed": removed,
        })),
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown");
                output.push_str("  ");
                output.push_str(name);
                output.push('\n');
            }
            output.push_str("\nEdit these files to customize the agent system prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "directory": target_dir.to_string_lossy(),
            "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
            "count": written.len()
        }))),
    }
}

/// Starts the MCP server with the specified transport.
///
/// One service instance is shared by every MCP session and runs until the
/// client disconnects (stdio) or the server is stopped (HTTP).
#[cfg(feature = "mcp")]
fn cmd_mcp(cmd: &McpCommands, cli: &Cli, db_path: &Path) -> Result<String> {
    use crate::mcp::{PvkgMcpServer, serve_http, serve_stdio};

    let config = config_builder(cli).build()?;
    let service = Arc::new(build_service(&config, db_path)?);
    let server = PvkgMcpServer::new(service);

    runtime()?
        .block_on(async {
            match cmd {
                McpCommands::Stdio => serve_stdio(server).await,
                McpCommands::Serve { host, port } => serve_http(server, host, *port).await,
            }
        })
        .map_err(|e| CommandError::ExecutionFailed(format!("MCP server error: {e}")))?;

    Ok(String::new())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::facts::sqlite::tests::TEST_SEED;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let db_path = temp.path().join("facts.db");
        let seed_path = temp.path().join("seed.json");
        std::fs::write(&seed_path, TEST_SEED).unwrap_or_else(|e| panic!("write: {e}"));
        (temp, db_path, seed_path)
    }

    fn cli(temp: &TempDir, command: Commands) -> Cli {
        Cli {
            db_path: Some(temp.path().join("facts.db")),
            cache_dir: Some(temp.path().join("cache")),
            verbose: false,
            format: "text".to_string(),
            command,
        }
    }

    #[test]
    fn test_import_then_refuse_without_force() {
        let (_temp, db_path, seed_path) = setup();
        let out = cmd_import(&db_path, &seed_path, false, OutputFormat::Text)
            .unwrap_or_else(|e| panic!("import: {e}"));
        assert!(out.contains("Imported 7 entities and 4 relations"));

        assert!(cmd_import(&db_path, &seed_path, false, OutputFormat::Text).is_err());
        let again = cmd_import(&db_path, &seed_path, true, OutputFormat::Json)
            .unwrap_or_else(|e| panic!("import: {e}"));
        assert!(again.contains("\"entity_count\": 7"));
    }

    #[test]
    fn test_facts_commands_need_import() {
        let (_temp, db_path, _) = setup();
        let err = execute_facts(&FactsCommands::Stats, &db_path, OutputFormat::Text)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("pvkg facts import"));
    }

    #[test]
    fn test_facts_search_and_entity() {
        let (_temp, db_path, seed_path) = setup();
        let _ = cmd_import(&db_path, &seed_path, false, OutputFormat::Text);

        let found = execute_facts(
            &FactsCommands::Search {
                keyword: "perovskite".to_string(),
            },
            &db_path,
            OutputFormat::Text,
        )
        .unwrap_or_else(|e| panic!("search: {e}"));
        assert!(found.contains("Methylammonium Lead Iodide (MAPbI3) (Absorber)"));

        let entity = execute_facts(
            &FactsCommands::Entity {
                name: "PERC".to_string(),
            },
            &db_path,
            OutputFormat::Text,
        )
        .unwrap_or_else(|e| panic!("entity: {e}"));
        assert!(entity.contains("recordEfficiency_pct"));

        assert!(
            execute_facts(
                &FactsCommands::Entity {
                    name: "Unobtainium".to_string()
                },
                &db_path,
                OutputFormat::Text,
            )
            .is_err()
        );
    }

    #[test]
    fn test_context_only_needs_no_credentials() {
        let (temp, db_path, seed_path) = setup();
        let _ = cmd_import(&db_path, &seed_path, false, OutputFormat::Text);
        let cli = cli(
            &temp,
            Commands::Ask {
                query: "What is the bandgap of MAPbI3?".to_string(),
                context_only: true,
                prompt_dir: None,
            },
        );
        let out = execute(&cli).unwrap_or_else(|e| panic!("context: {e}"));
        assert!(out.contains("MAPbI3"));
    }

    #[test]
    fn test_cache_commands_offline() {
        let (temp, _, _) = setup();
        let stats = execute(&cli(&temp, Commands::Cache(CacheCommands::Stats)))
            .unwrap_or_else(|e| panic!("stats: {e}"));
        assert!(stats.contains("Persisted answers: 0"));

        let cleared = execute(&cli(
            &temp,
            Commands::Cache(CacheCommands::Clear {
                tier: CacheTier::All,
            }),
        ))
        .unwrap_or_else(|e| panic!("clear: {e}"));
        assert_eq!(cleared, "Cleared 0 cache entries (all).\n");
    }

    #[test]
    fn test_init_prompts() {
        let temp = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let out = cmd_init_prompts(Some(temp.path()), OutputFormat::Text)
            .unwrap_or_else(|e| panic!("init: {e}"));
        assert!(out.contains("Wrote 2 prompt template(s)"));
        let again = cmd_init_prompts(Some(temp.path()), OutputFormat::Text)
            .unwrap_or_else(|e| panic!("init: {e}"));
        assert!(again.contains("already exist"));
    }
}
