//! Multi-step reasoning agent (ReAct loop).
//!
//! The model decides, turn by turn, which fact-base tools to call. The
//! session is an explicit state machine:
//!
//! ```text
//! Start ──cache hit──────────────────────────────▶ (cached outcome)
//!   │
//!   ▼
//! AwaitingModel ──Final──▶ Done ──▶ (answered, cached)
//!   │  ▲      │ │
//!   │  │      │ └─iteration > max──▶ Exhausted ──▶ (not cached)
//!   │  │      └───deadline passed──▶ TimedOut  ──▶ (not cached)
//!   ▼  │
//! ExecutingTools
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::context::truncate_chars;
use super::executor::{ToolExecutor, arguments_object};
use super::message::{
    ChatMessage, ChatResponse, ModelTurn, assistant_tool_calls_message, tool_message,
};
use super::provider::LlmProvider;
use super::tool::{ToolCall, ToolSet};
use super::traits::Agent;
use crate::cache::PersistentCache;
use crate::error::{AgentError, CacheError};
use crate::facts::FactQuery;

/// Answer used when the model ends without text.
pub const EMPTY_ANSWER: &str = "No answer generated.";
/// Answer used when the iteration bound is reached.
pub const EXHAUSTED_ANSWER: &str = "Reached maximum reasoning steps.";
/// Answer used when the session deadline passes.
pub const TIMED_OUT_ANSWER: &str = "Reasoning session timed out.";
/// Maximum characters kept from a tool observation in the trace.
pub const RESULT_PREVIEW_CHARS: usize = 300;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model gave a final answer.
    Answered,
    /// Served from the session cache.
    Cached,
    /// The iteration bound was reached.
    Exhausted,
    /// The session deadline passed.
    TimedOut,
}

impl StopReason {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Cached => "cached",
            Self::Exhausted => "exhausted",
            Self::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool invocation made during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Model call (1-based) that requested the tool.
    pub iteration: usize,
    /// Tool name as requested.
    pub tool_name: String,
    /// Parsed arguments (`{}` when malformed).
    pub arguments: serde_json::Value,
    /// First characters of the observation.
    pub result_preview: String,
}

/// Result bundle of a reasoning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningOutcome {
    /// Final answer text.
    pub answer: String,
    /// Tool invocations in execution order.
    pub trace: Vec<ToolInvocation>,
    /// Number of model calls made.
    pub iteration_count: usize,
    /// True when served from the session cache.
    pub served_from_cache: bool,
    /// Why the session ended.
    pub stop_reason: StopReason,
}

enum State {
    Start,
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
    Exhausted,
    TimedOut,
}

/// Per-query transcript and trace.
struct Session {
    transcript: Vec<ChatMessage>,
    iteration: usize,
    trace: Vec<ToolInvocation>,
}

/// ReAct agent over the fact-base tools.
pub struct ReasoningAgent {
    executor: ToolExecutor,
    provider: Arc<dyn LlmProvider>,
    cache: PersistentCache<ReasoningOutcome>,
    tools: ToolSet,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    session_timeout: Duration,
    max_iterations: usize,
}

impl std::fmt::Debug for ReasoningAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningAgent")
            .field("model", &self.model)
            .field("provider", &self.provider.name())
            .field("max_iterations", &self.max_iterations)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ReasoningAgent {
    /// Creates the agent with its own session cache.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        system_prompt: impl Into<String>,
        facts: Arc<dyn FactQuery>,
        provider: Arc<dyn LlmProvider>,
        cache: PersistentCache<ReasoningOutcome>,
    ) -> Self {
        Self {
            executor: ToolExecutor::new(facts),
            provider,
            cache,
            tools: ToolSet::reasoning_tools(),
            model: config.reasoning_model.clone(),
            system_prompt: system_prompt.into(),
            temperature: config.temperature,
            max_tokens: config.reasoning_max_tokens,
            timeout: config.timeout,
            session_timeout: config.session_timeout,
            max_iterations: config.max_iterations,
        }
    }

    /// Iteration bound.
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Number of stored sessions.
    pub fn cached_sessions(&self) -> usize {
        self.cache.len()
    }

    /// The session cache.
    pub const fn cache(&self) -> &PersistentCache<ReasoningOutcome> {
        &self.cache
    }

    /// Drops every stored session, returning how many there were.
    pub fn clear_cache(&self) -> Result<usize, CacheError> {
        self.cache.clear()
    }

    /// Runs a reasoning session for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] or [`AgentError::Timeout`] when a
    /// model call fails; tool failures never abort the session.
    pub async fn answer(&self, query: &str) -> Result<ReasoningOutcome, AgentError> {
        let deadline = Instant::now() + self.session_timeout;
        let mut session = Session {
            transcript: self.opening(query),
            iteration: 0,
            trace: Vec::new(),
        };
        let mut state = State::Start;

        loop {
            state = match state {
                State::Start => {
                    if let Some(mut hit) = self.cache.get(query) {
                        info!(agent = self.name(), "session cache hit");
                        hit.served_from_cache = true;
                        hit.stop_reason = StopReason::Cached;
                        return Ok(hit);
                    }
                    info!(agent = self.name(), "session cache miss");
                    State::AwaitingModel
                }

                State::AwaitingModel => {
                    session.iteration += 1;
                    if session.iteration > self.max_iterations {
                        State::Exhausted
                    } else {
                        debug!(iteration = session.iteration, "awaiting model");
                        match self.call_model(&session.transcript, deadline).await? {
                            Some(response) => match response.turn() {
                                ModelTurn::Final(text) => State::Done(text),
                                ModelTurn::ToolRequests(calls) => State::ExecutingTools(calls),
                            },
                            None => State::TimedOut,
                        }
                    }
                }

                State::ExecutingTools(calls) => {
                    debug!(
                        iteration = session.iteration,
                        tool_count = calls.len(),
                        "executing tool calls"
                    );
                    session
                        .transcript
                        .push(assistant_tool_calls_message(calls.clone()));
                    for call in &calls {
                        let result = self.executor.execute(call);
                        session.trace.push(ToolInvocation {
                            iteration: session.iteration,
                            tool_name: call.name.clone(),
                            arguments: arguments_object(call),
                            result_preview: truncate_chars(&result.content, RESULT_PREVIEW_CHARS)
                                .to_string(),
                        });
                        session
                            .transcript
                            .push(tool_message(&result.tool_call_id, &result.content));
                    }
                    State::AwaitingModel
                }

                State::Done(text) => {
                    let text = text.trim();
                    let outcome = ReasoningOutcome {
                        answer: if text.is_empty() {
                            EMPTY_ANSWER.to_string()
                        } else {
                            text.to_string()
                        },
                        trace: session.trace,
                        iteration_count: session.iteration,
                        served_from_cache: false,
                        stop_reason: StopReason::Answered,
                    };
                    if let Err(e) = self.cache.put(query, outcome.clone()) {
                        warn!(error = %e, "failed to persist reasoning session");
                    }
                    return Ok(outcome);
                }

                State::Exhausted => {
                    warn!(max_iterations = self.max_iterations, "reasoning steps exhausted");
                    return Ok(ReasoningOutcome {
                        answer: EXHAUSTED_ANSWER.to_string(),
                        trace: session.trace,
                        iteration_count: self.max_iterations,
                        served_from_cache: false,
                        stop_reason: StopReason::Exhausted,
                    });
                }

                State::TimedOut => {
                    warn!(
                        seconds = self.session_timeout.as_secs(),
                        "reasoning session deadline passed"
                    );
                    return Ok(ReasoningOutcome {
                        answer: TIMED_OUT_ANSWER.to_string(),
                        trace: session.trace,
                        iteration_count: session.iteration,
                        served_from_cache: false,
                        stop_reason: StopReason::TimedOut,
                    });
                }
            };
        }
    }

    /// One model call bounded by the request timeout and the session
    /// deadline. `Ok(None)` means the deadline passed.
    async fn call_model(
        &self,
        transcript: &[ChatMessage],
        deadline: Instant,
    ) -> Result<Option<ChatResponse>, AgentError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        let limit = remaining.min(self.timeout);
        let request = self.request(transcript.to_vec());

        match tokio::time::timeout(limit, self.provider.chat(&request)).await {
            Ok(response) => response.map(Some),
            Err(_) if limit < self.timeout => Ok(None),
            Err(_) => Err(AgentError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

impl Agent for ReasoningAgent {
    fn name(&self) -> &'static str {
        "reasoning"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn tools(&self) -> ToolSet {
        self.tools.clone()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use crate::agent::message::{ChatRequest, Role};
    use crate::agent::prompt::REASONING_SYSTEM_PROMPT;
    use crate::agent::tool::names;
    use crate::facts::sqlite::tests::seeded_store;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    type Script = Box<dyn Fn(usize) -> Result<ChatResponse, AgentError> + Send + Sync>;

    /// Provider driven by a function of the (0-based) call number.
    pub(crate) struct ScriptedProvider {
        script: Script,
        delay: Duration,
        pub(crate) calls: AtomicUsize,
        pub(crate) requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(
            script: impl Fn(usize) -> Result<ChatResponse, AgentError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Box::new(script),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut log) = self.requests.lock() {
                log.push(request.clone());
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.script)(n)
        }
    }

    pub(crate) fn tool_turn(calls: &[(&str, &str, &str)]) -> ChatResponse {
        ChatResponse {
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| ToolCall {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                    arguments: (*args).to_string(),
                })
                .collect(),
            finish_reason: Some("tool_calls".to_string()),
            ..ChatResponse::default()
        }
    }

    pub(crate) fn final_turn(text: &str) -> ChatResponse {
        ChatResponse {
            content: text.to_string(),
            finish_reason: Some("stop".to_string()),
            ..ChatResponse::default()
        }
    }

    fn agent_with(
        dir: &TempDir,
        provider: Arc<ScriptedProvider>,
        config: &AgentConfig,
    ) -> ReasoningAgent {
        ReasoningAgent::new(
            config,
            REASONING_SYSTEM_PROMPT,
            Arc::new(seeded_store()),
            provider,
            PersistentCache::open(dir.path().join("sessions.json"), Duration::from_secs(3600)),
        )
    }

    fn agent(dir: &TempDir, provider: Arc<ScriptedProvider>) -> ReasoningAgent {
        agent_with(dir, provider, &AgentConfig::builder().build_unauthenticated())
    }

    #[tokio::test]
    async fn test_search_then_answer() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(ScriptedProvider::new(|n| {
            Ok(if n == 0 {
                tool_turn(&[("call_0", names::KEYWORD_SEARCH, r#"{"keyword":"perovskite"}"#)])
            } else {
                final_turn("Methylammonium Lead Iodide (MAPbI3) is a perovskite absorber.")
            })
        }));
        let agent = agent(&dir, Arc::clone(&provider));

        let outcome = agent
            .answer("Which perovskites are in the graph?")
            .await
            .unwrap_or_else(|e| panic!("answer: {e}"));
        assert_eq!(outcome.stop_reason, StopReason::Answered);
        assert_eq!(outcome.iteration_count, 2);
        assert_eq!(outcome.trace.len(), 1);
        assert_eq!(outcome.trace[0].iteration, 1);
        assert_eq!(outcome.trace[0].tool_name, names::KEYWORD_SEARCH);
        assert_eq!(outcome.trace[0].arguments["keyword"], "perovskite");
        assert!(outcome.trace[0].result_preview.contains("MAPbI3"));
        assert!(!outcome.served_from_cache);

        let again = agent
            .answer("which perovskites are in the graph?  ")
            .await
            .unwrap_or_else(|e| panic!("answer: {e}"));
        assert!(again.served_from_cache);
        assert_eq!(again.stop_reason, StopReason::Cached);
        assert_eq!(again.answer, outcome.answer);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_never_ending_tools_exhaust() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(ScriptedProvider::new(|n| {
            let id = format!("call_{n}");
            Ok(tool_turn(&[(id.as_str(), names::ABSORBERS, "{}")]))
        }));
        let config = AgentConfig::builder()
            .max_iterations(3)
            .build_unauthenticated();
        let agent = agent_with(&dir, Arc::clone(&provider), &config);

        let outcome = agent
            .answer("loop forever")
            .await
            .unwrap_or_else(|e| panic!("answer: {e}"));
        assert_eq!(outcome.answer, EXHAUSTED_ANSWER);
        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        assert_eq!(outcome.iteration_count, 3);
        assert_eq!(outcome.trace.len(), 3);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(agent.cached_sessions(), 0);
    }

    #[tokio::test]
    async fn test_observations_follow_request_order() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(ScriptedProvider::new(|n| {
            Ok(if n == 0 {
                tool_turn(&[
                    ("call_a", names::ABSORBERS, "{}"),
                    ("call_b", names::DEFECTS, "{}"),
                ])
            } else {
                final_turn("done")
            })
        }));
        let agent = agent(&dir, Arc::clone(&provider));
        let outcome = agent
            .answer("absorbers and defects")
            .await
            .unwrap_or_else(|e| panic!("answer: {e}"));
        assert_eq!(outcome.trace.len(), 2);
        assert!(outcome.trace.iter().all(|t| t.iteration == 1));

        let requests = provider.requests.lock().unwrap_or_else(|e| panic!("{e}"));
        let second = &requests[1].messages;
        let roles: Vec<Role> = second.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(second[4].tool_call_id.as_deref(), Some("call_b"));
        assert_eq!(requests[0].tools.len(), 7);
    }

    #[tokio::test]
    async fn test_bad_tool_requests_become_observations() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(ScriptedProvider::new(|n| {
            Ok(if n == 0 {
                tool_turn(&[
                    ("call_x", "launch_rockets", "{}"),
                    ("call_y", names::KEYWORD_SEARCH, "{broken"),
                ])
            } else {
                final_turn("   ")
            })
        }));
        let agent = agent(&dir, Arc::clone(&provider));
        let outcome = agent
            .answer("anything")
            .await
            .unwrap_or_else(|e| panic!("answer: {e}"));

        assert_eq!(outcome.answer, EMPTY_ANSWER);
        assert!(outcome.trace[0].result_preview.contains("unknown tool"));
        assert_eq!(outcome.trace[1].arguments, serde_json::json!({}));
        assert!(outcome.trace[1].result_preview.contains("error"));
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(ScriptedProvider::new(|_| {
            Err(AgentError::ApiRequest {
                message: "503".to_string(),
                status: Some(503),
            })
        }));
        let agent = agent(&dir, provider);
        let result = agent.answer("anything").await;
        assert!(matches!(result, Err(AgentError::ApiRequest { .. })));
        assert_eq!(agent.cached_sessions(), 0);
    }

    #[tokio::test]
    async fn test_session_deadline() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(
            ScriptedProvider::new(|_| Ok(final_turn("too late")))
                .slow(Duration::from_millis(500)),
        );
        let config = AgentConfig::builder()
            .session_timeout(Duration::from_millis(50))
            .build_unauthenticated();
        let agent = agent_with(&dir, provider, &config);

        let outcome = agent
            .answer("slow question")
            .await
            .unwrap_or_else(|e| panic!("answer: {e}"));
        assert_eq!(outcome.stop_reason, StopReason::TimedOut);
        assert_eq!(outcome.answer, TIMED_OUT_ANSWER);
        assert_eq!(agent.cached_sessions(), 0);
    }

    #[tokio::test]
    async fn test_request_timeout_is_an_error() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(
            ScriptedProvider::new(|_| Ok(final_turn("too late")))
                .slow(Duration::from_millis(500)),
        );
        let config = AgentConfig::builder()
            .timeout(Duration::from_millis(20))
            .build_unauthenticated();
        let agent = agent_with(&dir, provider, &config);

        let result = agent.answer("slow question").await;
        assert!(matches!(result, Err(AgentError::Timeout { .. })));
    }
}
