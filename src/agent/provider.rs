//! Pluggable text-generation provider trait.
//!
//! Implementations translate [`ChatRequest`]/[`ChatResponse`] into
//! provider-specific SDK calls, keeping agent logic independent of the
//! vendor.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Trait for text-generation backends.
///
/// Implementations make exactly one attempt per call; retry policy, if
/// any, belongs to the caller.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"groq"`, `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] on transport or API failures.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
