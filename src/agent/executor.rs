//! Tool executor that dispatches tool calls to the fact base.
//!
//! Every failure (unknown tool, bad arguments, fact-base error) becomes an
//! `{"error": ...}` observation for the model; nothing here aborts a
//! reasoning session.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::tool::{ToolCall, ToolResult, names};
use crate::error::AgentError;
use crate::facts::FactQuery;

/// Maximum raw byte length of tool argument JSON from the model.
const MAX_TOOL_ARGS_LEN: usize = 100_000;
/// Row cap for `raw_query`.
pub const RAW_QUERY_MAX_ROWS: usize = 40;
/// Result cap for `keyword_search`.
pub const KEYWORD_SEARCH_MAX: usize = 20;
/// Result cap for `get_relationships`.
pub const RELATIONSHIPS_MAX: usize = 60;

/// Executes tool calls against a shared fact base.
#[derive(Clone)]
pub struct ToolExecutor {
    facts: Arc<dyn FactQuery>,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor").finish_non_exhaustive()
    }
}

/// Parses a call's arguments into a JSON object for the trace.
///
/// Malformed or non-object arguments yield an empty object.
#[must_use]
pub fn arguments_object(call: &ToolCall) -> Value {
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(v @ Value::Object(_)) => v,
        _ => json!({}),
    }
}

impl ToolExecutor {
    /// Creates an executor over `facts`.
    #[must_use]
    pub fn new(facts: Arc<dyn FactQuery>) -> Self {
        Self { facts }
    }

    /// Runs one tool call and returns its observation.
    #[must_use]
    pub fn execute(&self, call: &ToolCall) -> ToolResult {
        let result = if call.arguments.len() > MAX_TOOL_ARGS_LEN {
            Err(AgentError::MalformedToolArguments {
                name: call.name.clone(),
                message: format!(
                    "arguments too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
                    call.arguments.len()
                ),
            })
        } else {
            self.dispatch(&call.name, &call.arguments)
        };

        match result {
            Ok(content) => {
                debug!(tool = %call.name, bytes = content.len(), "tool succeeded");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content,
                    is_error: false,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content: json!({ "error": e.to_string() }).to_string(),
                    is_error: true,
                }
            }
        }
    }

    fn dispatch(&self, name: &str, args: &str) -> Result<String, AgentError> {
        match name {
            names::RAW_QUERY => self.tool_raw_query(args),
            names::ENTITY_DETAILS => self.tool_entity_details(args),
            names::KEYWORD_SEARCH => self.tool_keyword_search(args),
            names::ABSORBERS => render(name, self.facts.absorbers()),
            names::ARCHITECTURES => render(name, self.facts.architectures()),
            names::DEFECTS => render(name, self.facts.defects_with_impacts()),
            names::RELATIONSHIPS => render(
                name,
                self.facts.relationships().map(|mut rows| {
                    rows.truncate(RELATIONSHIPS_MAX);
                    rows
                }),
            ),
            other => Err(AgentError::UnknownTool {
                name: other.to_string(),
            }),
        }
    }

    fn tool_raw_query(&self, args: &str) -> Result<String, AgentError> {
        #[derive(Deserialize)]
        struct Args {
            query: String,
        }
        let args: Args = parse_args(names::RAW_QUERY, args)?;
        render(
            names::RAW_QUERY,
            self.facts.raw_query(&args.query, RAW_QUERY_MAX_ROWS),
        )
    }

    fn tool_entity_details(&self, args: &str) -> Result<String, AgentError> {
        #[derive(Deserialize)]
        struct Args {
            entity_name: String,
        }
        let args: Args = parse_args(names::ENTITY_DETAILS, args)?;
        let details = self
            .facts
            .entity_details(&args.entity_name)
            .map_err(|e| tool_error(names::ENTITY_DETAILS, &e))?;
        if details.is_empty() {
            return Err(AgentError::ToolExecution {
                name: names::ENTITY_DETAILS.to_string(),
                message: format!("no entity named '{}'", args.entity_name),
            });
        }
        to_json(
            names::ENTITY_DETAILS,
            &json!({ "entity": args.entity_name, "details": details }),
        )
    }

    fn tool_keyword_search(&self, args: &str) -> Result<String, AgentError> {
        #[derive(Deserialize)]
        struct Args {
            keyword: String,
        }
        let args: Args = parse_args(names::KEYWORD_SEARCH, args)?;
        render(
            names::KEYWORD_SEARCH,
            self.facts.search_by_keyword(&args.keyword).map(|mut rows| {
                rows.truncate(KEYWORD_SEARCH_MAX);
                rows
            }),
        )
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(name: &str, args: &str) -> Result<T, AgentError> {
    // Some providers send an empty string for tools without required fields.
    let args = if args.trim().is_empty() { "{}" } else { args };
    serde_json::from_str(args).map_err(|e| AgentError::MalformedToolArguments {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn tool_error(name: &str, e: &crate::error::FactError) -> AgentError {
    AgentError::ToolExecution {
        name: name.to_string(),
        message: e.to_string(),
    }
}

fn render<T: serde::Serialize>(
    name: &str,
    rows: Result<T, crate::error::FactError>,
) -> Result<String, AgentError> {
    let rows = rows.map_err(|e| tool_error(name, &e))?;
    to_json(name, &rows)
}

fn to_json<T: serde::Serialize + ?Sized>(name: &str, value: &T) -> Result<String, AgentError> {
    serde_json::to_string_pretty(value).map_err(|e| AgentError::ToolExecution {
        name: name.to_string(),
        message: format!("serialization error: {e}"),
    })
}
