//! Agent trait definition.
//!
//! Both agents describe their model settings through [`Agent`] so request
//! construction lives in one place.

use async_trait::async_trait;

use super::message::{ChatMessage, ChatRequest, ChatResponse, system_message, user_message};
use super::provider::LlmProvider;
use super::tool::ToolSet;
use crate::error::AgentError;

/// Model settings shared by every agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging.
    fn name(&self) -> &'static str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's behavior.
    fn system_prompt(&self) -> &str;

    /// Sampling temperature.
    fn temperature(&self) -> f32 {
        0.1
    }

    /// Maximum tokens per response.
    fn max_tokens(&self) -> u32 {
        1500
    }

    /// Tools offered to the model. Empty by default.
    fn tools(&self) -> ToolSet {
        ToolSet::none()
    }

    /// Builds a request carrying `messages` and this agent's settings.
    fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages,
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            tools: self.tools().definitions().to_vec(),
        }
    }

    /// Opening transcript: system prompt then the user message.
    fn opening(&self, user_msg: &str) -> Vec<ChatMessage> {
        vec![system_message(self.system_prompt()), user_message(user_msg)]
    }

    /// Sends one system + user exchange.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on provider failures.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<ChatResponse, AgentError> {
        let request = self.request(self.opening(user_msg));
        provider.chat(&request).await
    }
}
