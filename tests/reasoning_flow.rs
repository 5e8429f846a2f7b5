//! Reasoning sessions through the public service API, over the bundled
//! demo seed and a scripted model.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pvkg::agent::tool::names;
use pvkg::agent::{
    AgentConfig, ChatRequest, ChatResponse, LlmProvider, PromptSet, Role, StopReason, ToolCall,
};
use pvkg::facts::{FactQuery, FactSeed, SqliteFactStore};
use pvkg::{AgentError, KnowledgeService};
use tempfile::TempDir;

const SEED: &str = include_str!("../data/pv_seed.json");

type Script = dyn Fn(usize, &ChatRequest) -> ChatResponse + Send + Sync;

/// Replays one response per model call.
struct Scripted {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(script: impl Fn(usize, &ChatRequest) -> ChatResponse + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.script)(n, request))
    }
}

fn tool(id: &str, name: &str, arguments: &str) -> ChatResponse {
    ChatResponse {
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
        finish_reason: Some("tool_calls".to_string()),
        ..ChatResponse::default()
    }
}

fn text(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        finish_reason: Some("stop".to_string()),
        ..ChatResponse::default()
    }
}

fn facts() -> Arc<dyn FactQuery> {
    let seed = FactSeed::from_json(SEED).unwrap_or_else(|e| panic!("seed: {e}"));
    let store = SqliteFactStore::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
    store
        .import(&seed, false)
        .unwrap_or_else(|e| panic!("import: {e}"));
    Arc::new(store)
}

fn service(
    dir: &TempDir,
    max_iterations: usize,
    provider: Arc<dyn LlmProvider>,
) -> KnowledgeService {
    let config = AgentConfig::builder()
        .cache_dir(dir.path())
        .max_iterations(max_iterations)
        .build_unauthenticated();
    KnowledgeService::with_prompts(&config, PromptSet::defaults(), facts(), provider)
}

const DEFECT_QUERY: &str =
    "SELECT e.name FROM entities e JOIN relations r ON r.subject_id = e.id WHERE r.predicate = 'affectsMetric'";

#[tokio::test]
async fn defect_question_is_answered_with_provenance() {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let provider = Arc::new(Scripted::new(|n, request| match n {
        0 => tool(
            "call_0",
            names::RAW_QUERY,
            &serde_json::json!({ "query": DEFECT_QUERY }).to_string(),
        ),
        1 => {
            let observation = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::Tool)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            assert!(observation.contains("Iodide Vacancy"), "{observation}");
            tool(
                "call_1",
                names::ENTITY_DETAILS,
                r#"{"entity_name":"Iodide Vacancy"}"#,
            )
        }
        _ => text(
            "Iodide Vacancy defects lower the Open-Circuit Voltage (Voc) and the fill factor \
             of MAPbI3 cells.",
        ),
    }));
    let service = service(&dir, 6, Arc::clone(&provider) as Arc<dyn LlmProvider>);

    let reasoned = service
        .ask_with_reasoning("How do iodide vacancies hurt perovskite cells?")
        .await
        .unwrap_or_else(|e| panic!("reason: {e}"));

    let outcome = &reasoned.outcome;
    assert_eq!(outcome.stop_reason, StopReason::Answered);
    assert_eq!(outcome.iteration_count, 3);
    let tools: Vec<&str> = outcome.trace.iter().map(|t| t.tool_name.as_str()).collect();
    assert_eq!(tools, [names::RAW_QUERY, names::ENTITY_DETAILS]);

    let provenance = &reasoned.provenance;
    assert!(!provenance.served_from_cache);
    assert!(provenance.cited_entities.iter().any(|e| e == "Iodide Vacancy"));
    assert!(
        provenance
            .cited_entities
            .iter()
            .any(|e| e == "Methylammonium Lead Iodide (MAPbI3)")
    );
    assert!(provenance.supporting_facts.iter().any(|f| {
        f.subject == "Iodide Vacancy"
            && f.relation == "affectsMetric"
            && f.object == "Open-Circuit Voltage (Voc)"
    }));
    assert_eq!(provenance.tool_queries_used, [DEFECT_QUERY]);
    assert!(provenance.to_markdown().contains("```sql"));

    let cached = service
        .ask_with_reasoning("how do iodide vacancies hurt perovskite cells?")
        .await
        .unwrap_or_else(|e| panic!("reason: {e}"));
    assert_eq!(cached.outcome.stop_reason, StopReason::Cached);
    assert!(cached.provenance.served_from_cache);
    assert_eq!(cached.outcome.answer, outcome.answer);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn endless_tool_use_is_cut_off_and_not_cached() {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let provider = Arc::new(Scripted::new(|n, _| {
        tool(&format!("call_{n}"), names::KEYWORD_SEARCH, r#"{"keyword":"silicon"}"#)
    }));
    let service = service(&dir, 2, Arc::clone(&provider) as Arc<dyn LlmProvider>);

    let reasoned = service
        .ask_with_reasoning("Tell me everything about silicon")
        .await
        .unwrap_or_else(|e| panic!("reason: {e}"));
    assert_eq!(reasoned.outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(reasoned.outcome.iteration_count, 2);
    assert_eq!(reasoned.outcome.trace.len(), 2);
    assert_eq!(provider.calls(), 2);
    assert_eq!(service.cache_stats().reasoning_entries, 0);
}

#[tokio::test]
async fn grounded_answer_is_built_from_context() {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let provider = Arc::new(Scripted::new(|_, request| {
        let prompt = request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        assert!(prompt.contains("1.55"), "{prompt}");
        assert!(request.tools.is_empty());
        text("MAPbI3 has a bandgap of 1.55 eV.")
    }));
    let service = service(&dir, 6, Arc::clone(&provider) as Arc<dyn LlmProvider>);

    let first = service
        .ask("What is the bandgap of MAPbI3?")
        .await
        .unwrap_or_else(|e| panic!("ask: {e}"));
    let second = service
        .ask("  what is the bandgap of mapbi3?  ")
        .await
        .unwrap_or_else(|e| panic!("ask: {e}"));
    assert_eq!(first, "MAPbI3 has a bandgap of 1.55 eV.");
    assert_eq!(second, first);
    assert_eq!(provider.calls(), 1);
    assert!(service.context("bandgap of MAPbI3").contains("1.55"));
}
