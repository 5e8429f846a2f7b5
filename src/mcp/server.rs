//! MCP server implementation for pvkg.
//!
//! Each tool maps onto one [`KnowledgeService`] operation. The service is
//! `Send + Sync`, so every MCP session shares the same instance and caches.

use std::sync::Arc;

use clap::ValueEnum;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use serde::Serialize;

use crate::error::AgentError;
use crate::service::{CacheTier, KnowledgeService};

use super::params::{CacheClearParams, QueryParams};

fn to_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn agent_error(e: AgentError) -> McpError {
    match e {
        AgentError::InvalidQuery { .. } => McpError::invalid_params(e.to_string(), None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

/// pvkg MCP server.
#[derive(Clone)]
pub struct PvkgMcpServer {
    tool_router: ToolRouter<Self>,
    service: Arc<KnowledgeService>,
}

#[tool_router]
impl PvkgMcpServer {
    /// Single-shot grounded answer.
    #[tool(
        name = "ask",
        description = "Answer a photovoltaics question from the fact base in one grounded model call. Answers are cached. Returns JSON with the query and answer."
    )]
    async fn ask(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let answer = self.service.ask(&params.query).await.map_err(agent_error)?;
        to_json(&serde_json::json!({
            "query": params.query,
            "answer": answer,
        }))
    }

    /// Multi-step reasoning answer with provenance.
    #[tool(
        name = "ask_with_reasoning",
        description = "Answer a photovoltaics question with a reasoning agent that queries the fact base through tools. Returns JSON with the answer, the tool trace, the stop reason and a provenance record of cited entities and supporting facts."
    )]
    async fn ask_with_reasoning(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let reasoned = self
            .service
            .ask_with_reasoning(&params.query)
            .await
            .map_err(agent_error)?;
        to_json(&reasoned)
    }

    /// Cache counters.
    #[tool(
        name = "cache_stats",
        description = "Report answer cache, context cache and reasoning cache counters."
    )]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        to_json(&self.service.cache_stats())
    }

    /// Clears one or every cache tier.
    #[tool(
        name = "cache_clear",
        description = "Clear cached results. Optional tier: all (default), answers, contexts, reasoning. Returns the number of entries removed."
    )]
    async fn cache_clear(
        &self,
        Parameters(params): Parameters<CacheClearParams>,
    ) -> Result<CallToolResult, McpError> {
        let tier = match params.tier.as_deref() {
            None => CacheTier::All,
            Some(name) => CacheTier::from_str(name, true).map_err(|_| {
                McpError::invalid_params(format!("unknown cache tier: {name}"), None)
            })?,
        };
        let removed = self
            .service
            .cache_clear_tier(tier)
            .map_err(|e| McpError::internal_error(format!("Cache error: {e}"), None))?;
        to_json(&serde_json::json!({ "removed": removed }))
    }
}

#[tool_handler]
impl ServerHandler for PvkgMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pvkg".to_string(),
                title: Some("pvkg MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "pvkg answers photovoltaics questions from a curated fact base. Use `ask` for \
                 quick grounded answers and `ask_with_reasoning` when the question needs \
                 several lookups or an auditable provenance record."
                    .to_string(),
            ),
        }
    }
}

impl PvkgMcpServer {
    /// Creates a server over a shared service.
    #[must_use]
    pub fn new(service: Arc<KnowledgeService>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    /// The shared service.
    #[must_use]
    pub fn service(&self) -> &Arc<KnowledgeService> {
        &self.service
    }
}
