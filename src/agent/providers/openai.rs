//! OpenAI-compatible chat completions provider using `async-openai`.
//!
//! Serves both `OpenAI` and Groq: Groq exposes the same chat completions
//! API under its own base URL.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolType, CreateChatCompletionRequest, FunctionCall, FunctionObject,
};
use async_trait::async_trait;
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::agent::tool::ToolCall;
use crate::error::AgentError;

/// Groq's OpenAI-compatible endpoint.
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Which hosted service the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// `api.openai.com` (or the configured base URL).
    OpenAi,
    /// `api.groq.com` (or the configured base URL).
    Groq,
}

impl Flavor {
    const fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
        }
    }

    const fn default_base(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => None,
            Self::Groq => Some(GROQ_API_BASE),
        }
    }
}

/// OpenAI-compatible text-generation provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    flavor: Flavor,
}

impl OpenAiProvider {
    /// Creates a provider from agent configuration.
    ///
    /// An explicit `base_url` overrides the flavor's default endpoint.
    #[must_use]
    pub fn new(config: &AgentConfig, flavor: Flavor) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(base_url) = config.base_url.as_deref().or(flavor.default_base()) {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            flavor,
        }
    }

    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
                    msg.tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect()
                });
                let content = (!msg.content.is_empty()).then(|| {
                    ChatCompletionRequestAssistantMessageContent::Text(msg.content.clone())
                });

                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(msg.content.clone()),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        }
    }

    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let tools = (!request.tools.is_empty()).then(|| {
            request
                .tools
                .iter()
                .map(|td| ChatCompletionTool {
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionObject {
                        name: td.name.clone(),
                        description: Some(td.description.clone()),
                        parameters: Some(td.parameters.clone()),
                        strict: None,
                    },
                })
                .collect()
        });

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            tools,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("flavor", &self.flavor)
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        self.flavor.name()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| AgentError::ApiRequest {
                message: e.to_string(),
                status: None,
            })?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let tool_calls: Vec<ToolCall> = choice
            .and_then(|c| c.message.tool_calls.as_ref())
            .map(|tcs| {
                tcs.iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        debug!(
            provider = self.name(),
            tokens = usage.total_tokens,
            tool_calls = tool_calls.len(),
            "chat completion received"
        );

        Ok(ChatResponse {
            content,
            usage,
            tool_calls,
            finish_reason,
        })
    }
}
