//! Knowledge service: the composition root.
//!
//! [`KnowledgeService`] owns both agents, their caches and the provenance
//! recorder, and exposes the operations every surface (CLI, MCP) shares.
//! Nothing here is global; callers construct it with the fact base and
//! provider they want, which is how tests inject fakes.

use std::sync::Arc;

use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use crate::agent::config::{AgentConfig, CacheSettings};
use crate::agent::grounded::GroundedAgent;
use crate::agent::prompt::PromptSet;
use crate::agent::provider::LlmProvider;
use crate::agent::reasoning::{ReasoningAgent, ReasoningOutcome};
use crate::cache::{CacheStats, PersistentCache, TwoTierCache};
use crate::error::{AgentError, CacheError};
use crate::facts::FactQuery;
use crate::provenance::{ProvenanceRecord, ProvenanceRecorder};

/// Longest accepted query, in bytes.
pub const MAX_QUERY_BYTES: usize = 10_000;

/// Cache tier selector for clearing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CacheTier {
    /// Every tier.
    #[default]
    All,
    /// Persisted single-shot answers.
    Answers,
    /// In-memory retrieval contexts.
    Contexts,
    /// Persisted reasoning sessions.
    Reasoning,
}

/// Cache counters across the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceCacheStats {
    /// Both tiers of the single-shot cache.
    pub answers: CacheStats,
    /// Entries in the reasoning session cache.
    pub reasoning_entries: usize,
    /// Reasoning loop bound.
    pub max_iterations: usize,
}

/// Reasoning answer together with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ReasonedAnswer {
    /// Answer, trace and loop metadata.
    pub outcome: ReasoningOutcome,
    /// Cited entities and supporting facts.
    pub provenance: ProvenanceRecord,
}

/// Caches opened from settings alone.
///
/// Lets cache administration run without credentials or a fact base.
#[derive(Debug)]
pub struct ServiceCaches {
    answers: TwoTierCache,
    reasoning: PersistentCache<ReasoningOutcome>,
}

impl ServiceCaches {
    /// Opens both cache files under `settings.dir`.
    #[must_use]
    pub fn open(settings: &CacheSettings) -> Self {
        Self {
            answers: TwoTierCache::new(settings.answer_path(), settings.ttl, settings.lru_capacity),
            reasoning: PersistentCache::open(settings.reasoning_path(), settings.ttl),
        }
    }

    /// Counters for every tier.
    #[must_use]
    pub fn stats(&self, max_iterations: usize) -> ServiceCacheStats {
        ServiceCacheStats {
            answers: self.answers.stats(),
            reasoning_entries: self.reasoning.len(),
            max_iterations,
        }
    }

    /// Clears `tier`, returning how many entries were dropped.
    pub fn clear(&self, tier: CacheTier) -> Result<usize, CacheError> {
        clear_tier(&self.answers, &self.reasoning, tier)
    }
}

fn clear_tier(
    answers: &TwoTierCache,
    reasoning: &PersistentCache<ReasoningOutcome>,
    tier: CacheTier,
) -> Result<usize, CacheError> {
    let removed = match tier {
        CacheTier::All => answers.clear()? + reasoning.clear()?,
        CacheTier::Answers => answers.clear_answers()?,
        CacheTier::Contexts => answers.clear_contexts(),
        CacheTier::Reasoning => reasoning.clear()?,
    };
    info!(?tier, removed, "cache cleared");
    Ok(removed)
}

/// Question answering over one fact base.
#[derive(Debug)]
pub struct KnowledgeService {
    grounded: GroundedAgent,
    reasoning: ReasoningAgent,
    recorder: ProvenanceRecorder,
}

impl KnowledgeService {
    /// Builds the service, loading prompts from `config.prompt_dir` (or the
    /// default prompt locations).
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        facts: Arc<dyn FactQuery>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self::with_prompts(config, prompts, facts, provider)
    }

    /// Builds the service with explicit prompts.
    #[must_use]
    pub fn with_prompts(
        config: &AgentConfig,
        prompts: PromptSet,
        facts: Arc<dyn FactQuery>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let ServiceCaches { answers, reasoning } = ServiceCaches::open(&config.cache);
        info!(
            provider = provider.name(),
            model = %config.model,
            cache_dir = %config.cache.dir.display(),
            "knowledge service ready"
        );
        Self {
            grounded: GroundedAgent::new(
                config,
                prompts.grounded,
                Arc::clone(&facts),
                Arc::clone(&provider),
                answers,
            ),
            reasoning: ReasoningAgent::new(
                config,
                prompts.reasoning,
                Arc::clone(&facts),
                provider,
                reasoning,
            ),
            recorder: ProvenanceRecorder::new(facts),
        }
    }

    /// Single-shot grounded answer.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidQuery`] for empty or over-long queries.
    /// Model failures come back as answer text.
    pub async fn ask(&self, query: &str) -> Result<String, AgentError> {
        validate_query(query)?;
        Ok(self.grounded.answer(query).await)
    }

    /// Reasoning answer with trace and provenance.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidQuery`] for empty or over-long queries
    /// and the transport error when a model call fails.
    pub async fn ask_with_reasoning(&self, query: &str) -> Result<ReasonedAnswer, AgentError> {
        validate_query(query)?;
        let outcome = self.reasoning.answer(query).await?;
        let provenance = self.recorder.record(
            query,
            &outcome.answer,
            &outcome.trace,
            outcome.iteration_count,
            outcome.served_from_cache,
        );
        Ok(ReasonedAnswer {
            outcome,
            provenance,
        })
    }

    /// Retrieval context the single-shot agent would use for `query`.
    pub fn context(&self, query: &str) -> String {
        self.grounded.context(query)
    }

    /// Counters for every cache.
    pub fn cache_stats(&self) -> ServiceCacheStats {
        ServiceCacheStats {
            answers: self.grounded.cache_stats(),
            reasoning_entries: self.reasoning.cached_sessions(),
            max_iterations: self.reasoning.max_iterations(),
        }
    }

    /// Clears every cache, returning the combined count.
    pub fn cache_clear(&self) -> Result<usize, CacheError> {
        self.cache_clear_tier(CacheTier::All)
    }

    /// Clears one tier.
    pub fn cache_clear_tier(&self, tier: CacheTier) -> Result<usize, CacheError> {
        clear_tier(self.grounded.cache(), self.reasoning.cache(), tier)
    }
}

/// Rejects empty and over-long queries.
pub fn validate_query(query: &str) -> Result<(), AgentError> {
    if query.trim().is_empty() {
        return Err(AgentError::InvalidQuery {
            message: "query is empty".to_string(),
        });
    }
    if query.len() > MAX_QUERY_BYTES {
        return Err(AgentError::InvalidQuery {
            message: format!(
                "query is {} bytes, the limit is {MAX_QUERY_BYTES}",
                query.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::grounded::tests::EchoProvider;
    use crate::agent::reasoning::StopReason;
    use crate::agent::reasoning::tests::{ScriptedProvider, final_turn, tool_turn};
    use crate::agent::tool::names;
    use crate::facts::sqlite::tests::seeded_store;

    use tempfile::TempDir;

    fn service(dir: &TempDir, provider: Arc<dyn LlmProvider>) -> KnowledgeService {
        let config = AgentConfig::builder()
            .cache_dir(dir.path())
            .build_unauthenticated();
        KnowledgeService::with_prompts(
            &config,
            PromptSet::defaults(),
            Arc::new(seeded_store()),
            provider,
        )
    }

    #[test]
    fn test_validate_query() {
        assert!(validate_query("bandgap of MAPbI3").is_ok());
        assert!(matches!(
            validate_query("   "),
            Err(AgentError::InvalidQuery { .. })
        ));
        let long = "x".repeat(MAX_QUERY_BYTES + 1);
        assert!(matches!(
            validate_query(&long),
            Err(AgentError::InvalidQuery { .. })
        ));
        assert!(validate_query(&"x".repeat(MAX_QUERY_BYTES)).is_ok());
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_query_without_model_call() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(EchoProvider::new("unused"));
        let service = service(&dir, Arc::clone(&provider) as Arc<dyn LlmProvider>);

        assert!(service.ask("").await.is_err());
        assert!(service.ask_with_reasoning(" \n").await.is_err());
        assert_eq!(
            provider.calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_reasoning_with_provenance() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(ScriptedProvider::new(|n| {
            Ok(if n == 0 {
                tool_turn(&[("call_0", names::KEYWORD_SEARCH, r#"{"keyword":"perovskite"}"#)])
            } else {
                final_turn(
                    "MAPbI3 is the perovskite absorber in the graph.\n\n## Sources\n- keyword_search",
                )
            })
        }));
        let service = service(&dir, provider);

        let reasoned = service
            .ask_with_reasoning("Which perovskite absorbers exist?")
            .await
            .unwrap_or_else(|e| panic!("reason: {e}"));
        assert_eq!(reasoned.outcome.trace.len(), 1);
        assert_eq!(reasoned.outcome.iteration_count, 2);
        assert_eq!(reasoned.outcome.stop_reason, StopReason::Answered);
        let cited = &reasoned.provenance.cited_entities;
        assert!(cited.iter().any(|name| name.contains("MAPbI3")));
        assert!(
            reasoned
                .provenance
                .supporting_facts
                .iter()
                .any(|f| f.subject.contains("MAPbI3"))
        );

        let again = service
            .ask_with_reasoning("which perovskite absorbers exist?")
            .await
            .unwrap_or_else(|e| panic!("reason: {e}"));
        assert!(again.provenance.served_from_cache);
        assert_eq!(again.provenance.iteration_count, 2);
    }

    #[tokio::test]
    async fn test_stats_and_clear_cover_every_tier() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(ScriptedProvider::new(|_| Ok(final_turn("PERC reaches 24 %."))));
        let service = service(&dir, provider);

        let _ = service
            .ask("What is the efficiency of PERC?")
            .await
            .unwrap_or_else(|e| panic!("ask: {e}"));
        let _ = service
            .ask_with_reasoning("What is the efficiency of PERC?")
            .await
            .unwrap_or_else(|e| panic!("reason: {e}"));

        let stats = service.cache_stats();
        assert_eq!(stats.answers.persistent_count, 1);
        assert_eq!(stats.answers.in_memory_size, 1);
        assert_eq!(stats.reasoning_entries, 1);
        assert_eq!(stats.max_iterations, 6);

        // one answer + one context + one session
        assert_eq!(service.cache_clear().unwrap_or(0), 3);
        let stats = service.cache_stats();
        assert_eq!(stats.answers.persistent_count, 0);
        assert_eq!(stats.reasoning_entries, 0);
    }

    #[tokio::test]
    async fn test_caches_survive_restart() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let provider = Arc::new(ScriptedProvider::new(|_| Ok(final_turn("PERC reaches 24 %."))));
        {
            let service = service(&dir, Arc::clone(&provider) as Arc<dyn LlmProvider>);
            let _ = service.ask("efficiency of PERC").await;
        }

        let settings = CacheSettings::default().with_dir(dir.path());
        let caches = ServiceCaches::open(&settings);
        assert_eq!(caches.stats(4).answers.persistent_count, 1);
        assert_eq!(caches.stats(4).max_iterations, 4);

        let service = service(&dir, Arc::clone(&provider) as Arc<dyn LlmProvider>);
        let answer = service
            .ask("Efficiency of PERC")
            .await
            .unwrap_or_else(|e| panic!("ask: {e}"));
        assert_eq!(answer, "PERC reaches 24 %.");
        assert_eq!(provider.call_count(), 1);

        assert_eq!(caches.clear(CacheTier::Reasoning).unwrap_or(9), 0);
        assert_eq!(caches.clear(CacheTier::Answers).unwrap_or(0), 1);
    }
}
