//! Question answering over the fact base.
//!
//! Two agents share one provider abstraction backed by OpenAI-compatible
//! APIs:
//!
//! ```text
//! query ─┬─▶ GroundedAgent   classify → build context → one model call
//!        └─▶ ReasoningAgent  model ⇄ fact-base tools, bounded by
//!                            max_iterations and a session deadline
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod executor;
pub mod grounded;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reasoning;
pub mod tool;
pub mod traits;

pub use client::create_provider;
pub use config::{AgentConfig, AgentConfigBuilder, CacheSettings};
pub use context::{Category, Classification, Section, build_context, classify};
pub use executor::ToolExecutor;
pub use grounded::GroundedAgent;
pub use message::{ChatMessage, ChatRequest, ChatResponse, ModelTurn, Role, TokenUsage};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use reasoning::{ReasoningAgent, ReasoningOutcome, StopReason, ToolInvocation};
pub use tool::{ToolCall, ToolDefinition, ToolResult, ToolSet};
pub use traits::Agent;
