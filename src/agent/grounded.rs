//! Single-shot grounding agent.
//!
//! Answers from a retrieval context built without the model's involvement,
//! with exactly one text-generation call per uncached query.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::context::build_context;
use super::prompt::build_grounded_prompt;
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::cache::{CacheStats, TwoTierCache};
use crate::error::{AgentError, CacheError};
use crate::facts::FactQuery;

/// Returned when no context could be built for a query.
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find relevant information in the PV Solar knowledge graph for that query.";

/// Single-shot question answering over a retrieval context.
pub struct GroundedAgent {
    facts: Arc<dyn FactQuery>,
    provider: Arc<dyn LlmProvider>,
    cache: TwoTierCache,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    overview_fallback: bool,
}

impl std::fmt::Debug for GroundedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroundedAgent")
            .field("model", &self.model)
            .field("provider", &self.provider.name())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl GroundedAgent {
    /// Creates the agent with its own answer cache.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        system_prompt: impl Into<String>,
        facts: Arc<dyn FactQuery>,
        provider: Arc<dyn LlmProvider>,
        cache: TwoTierCache,
    ) -> Self {
        Self {
            facts,
            provider,
            cache,
            model: config.model.clone(),
            system_prompt: system_prompt.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
            overview_fallback: config.overview_fallback,
        }
    }

    /// Answers `query`. Never fails: service errors come back as text.
    pub async fn answer(&self, query: &str) -> String {
        if let Some(hit) = self.cache.get(query) {
            info!(agent = self.name(), "answer cache hit");
            return hit;
        }
        info!(agent = self.name(), "answer cache miss");

        let context = self.context(query);
        if context.trim().is_empty() {
            debug!("empty retrieval context, skipping model call");
            return NO_CONTEXT_ANSWER.to_string();
        }

        let user_msg = build_grounded_prompt(&context, query);
        let reply = match tokio::time::timeout(
            self.timeout,
            self.execute(self.provider.as_ref(), &user_msg),
        )
        .await
        {
            Ok(Ok(response)) => response.content.trim().to_string(),
            Ok(Err(e)) => return service_error(&e),
            Err(_) => {
                return service_error(&AgentError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if let Err(e) = self.cache.put(query, &reply) {
            warn!(error = %e, "failed to persist answer");
        }
        reply
    }

    /// Retrieval context for `query`, served from the in-memory tier when
    /// possible.
    pub fn context(&self, query: &str) -> String {
        self.cache.contexts().get_or_build(query, || {
            build_context(self.facts.as_ref(), query, self.overview_fallback)
        })
    }

    /// Counters for both cache tiers.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The cache tiers, for selective clearing.
    pub const fn cache(&self) -> &TwoTierCache {
        &self.cache
    }

    /// Clears both tiers, returning the combined count.
    pub fn clear_cache(&self) -> Result<usize, CacheError> {
        self.cache.clear()
    }
}

fn service_error(e: &AgentError) -> String {
    warn!(error = %e, "text generation failed");
    format!("Error communicating with the language model: {e}")
}

impl Agent for GroundedAgent {
    fn name(&self) -> &'static str {
        "grounded"
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
}
