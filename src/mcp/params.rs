//! MCP tool parameter types.
//!
//! Input schemas for the MCP tools, generated with `schemars` as the MCP
//! protocol requires.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `ask` and `ask_with_reasoning` tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// The question to answer from the photovoltaics fact base.
    pub query: String,
}

/// Parameters for the `cache_clear` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearParams {
    /// Tier to clear: `"all"` (default), `"answers"`, `"contexts"` or
    /// `"reasoning"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}
