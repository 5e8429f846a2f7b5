//! Provider-agnostic message types for text-generation calls.
//!
//! Agents build transcripts from these types; providers translate them to
//! their SDK's wire format.

use serde::{Deserialize, Serialize};

use super::tool::{ToolCall, ToolDefinition};

/// Role of a chat message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
    /// Tool observation.
    Tool,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Message content.
    pub content: String,
    /// Tool calls requested by the assistant (only for `Role::Assistant`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool call ID this message responds to (only for `Role::Tool`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Tools the model may request.
    pub tools: Vec<ToolDefinition>,
}

/// Token usage statistics from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// A chat completion response.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Generated text content.
    pub content: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason from the model (e.g., `"stop"`, `"tool_calls"`).
    pub finish_reason: Option<String>,
}

/// What the model decided to do on one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTurn {
    /// A final message; no further tool use.
    Final(String),
    /// One or more tool invocations, in the order to run them.
    ToolRequests(Vec<ToolCall>),
}

impl ChatResponse {
    /// Classifies the reply. Tool requests win over any text that came
    /// with them.
    #[must_use]
    pub fn turn(self) -> ModelTurn {
        if self.tool_calls.is_empty() {
            ModelTurn::Final(self.content)
        } else {
            ModelTurn::ToolRequests(self.tool_calls)
        }
    }
}

/// Creates a system message.
#[must_use]
pub fn system_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::System,
        content: content.to_string(),
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

/// Creates a user message.
#[must_use]
pub fn user_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        content: content.to_string(),
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

/// Creates an assistant message carrying tool calls.
#[must_use]
pub const fn assistant_tool_calls_message(tool_calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage {
        role: Role::Assistant,
        content: String::new(),
        tool_calls,
        tool_call_id: None,
    }
}

/// Creates a tool observation message.
#[must_use]
pub fn tool_message(tool_call_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::Tool,
        content: content.to_string(),
        tool_calls: Vec::new(),
        tool_call_id: Some(tool_call_id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "get_absorbers".to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[test]
    fn test_turn_final() {
        let response = ChatResponse {
            content: "MAPbI3 has a bandgap of 1.55 eV.".to_string(),
            ..ChatResponse::default()
        };
        assert_eq!(
            response.turn(),
            ModelTurn::Final("MAPbI3 has a bandgap of 1.55 eV.".to_string())
        );
    }

    #[test]
    fn test_turn_tool_requests_win_over_text() {
        let response = ChatResponse {
            content: "Let me look that up.".to_string(),
            tool_calls: vec![call("a"), call("b")],
            ..ChatResponse::default()
        };
        match response.turn() {
            ModelTurn::ToolRequests(calls) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].id, "a");
            }
            ModelTurn::Final(_) => unreachable!(),
        }
    }

    #[test]
    fn test_tool_message() {
        let msg = tool_message("call_123", "{\"rows\":[]}");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    }

    #[test]
    fn test_assistant_tool_calls_message() {
        let msg = assistant_tool_calls_message(vec![call("call_1")]);
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_empty());
        assert_eq!(msg.tool_calls[0].name, "get_absorbers");
    }

    #[test]
    fn test_chat_message_serialization() {
        let json = serde_json::to_string(&user_message("test")).unwrap_or_default();
        assert!(json.contains("\"user\""));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
        let _ = system_message("x");
    }
}
