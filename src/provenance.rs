//! Answer provenance.
//!
//! Reconstructs, after the fact, which fact-base entities an answer cites
//! and which facts support them. Citation is a plain case-insensitive
//! substring match on entity names and their parenthetical abbreviations,
//! so a short name that happens to occur inside an unrelated word is cited
//! too.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::context::truncate_chars;
use crate::agent::reasoning::ToolInvocation;
use crate::agent::tool::names;
use crate::cache::content_hash;
use crate::facts::{FactQuery, Triple};

/// Maximum cited entities per record.
pub const MAX_CITED: usize = 15;
/// Cited entities whose details are fetched.
pub const MAX_DETAILED: usize = 8;
/// Maximum supporting facts per record.
pub const MAX_FACTS: usize = 25;
/// Literal queries shown in markdown. The record keeps all of them.
pub const MAX_QUERIES: usize = 5;
/// Characters of each literal query shown in markdown.
const QUERY_DISPLAY_CHARS: usize = 300;

static ABBREVIATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\(([^)]{2,20})\)").ok());

/// Auditable record of one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// SHA-256 hex of the query text.
    pub query_id: String,
    /// Query as asked.
    pub query_text: String,
    /// When the record was built.
    pub timestamp: DateTime<Utc>,
    /// Entity names found in the answer, in fact-base order.
    pub cited_entities: Vec<String>,
    /// Facts about the cited entities.
    pub supporting_facts: Vec<Triple>,
    /// Literal `raw_query` statements issued, in trace order.
    pub tool_queries_used: Vec<String>,
    /// Model calls made by the session.
    pub iteration_count: usize,
    /// True when the answer came from a cache.
    pub served_from_cache: bool,
}

impl ProvenanceRecord {
    /// Renders the record for display.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("### Provenance Record\n");
        let id_prefix = self.query_id.get(..16).unwrap_or(&self.query_id);
        let _ = writeln!(out, "- **Query ID:** `{id_prefix}…`");
        let _ = writeln!(
            out,
            "- **Timestamp:** {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(out, "- **Iterations:** {}", self.iteration_count);
        let _ = writeln!(
            out,
            "- **Served from cache:** {}",
            if self.served_from_cache { "yes" } else { "no" }
        );

        if !self.cited_entities.is_empty() {
            out.push_str("\n**Cited entities**\n\n| # | Entity |\n|---|---|\n");
            for (i, name) in self.cited_entities.iter().enumerate() {
                let _ = writeln!(out, "| {} | {} |", i + 1, cell(name));
            }
        }

        if !self.supporting_facts.is_empty() {
            out.push_str(
                "\n**Supporting facts**\n\n| Subject | Relation | Object |\n|---|---|---|\n",
            );
            for fact in &self.supporting_facts {
                let _ = writeln!(
                    out,
                    "| {} | *{}* | {} |",
                    cell(&fact.subject),
                    cell(&fact.relation),
                    cell(&fact.object)
                );
            }
        }

        if !self.tool_queries_used.is_empty() {
            out.push_str("\n**Queries executed**\n");
            for query in self.tool_queries_used.iter().take(MAX_QUERIES) {
                let _ = write!(
                    out,
                    "\n```sql\n{}\n```\n",
                    truncate_chars(query, QUERY_DISPLAY_CHARS)
                );
            }
        }
        out
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Lowercased parenthetical abbreviation in an entity name, if any.
fn abbreviation(name: &str) -> Option<String> {
    ABBREVIATION
        .as_ref()?
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Builds provenance records from the fact base.
#[derive(Clone)]
pub struct ProvenanceRecorder {
    facts: Arc<dyn FactQuery>,
}

impl std::fmt::Debug for ProvenanceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceRecorder").finish_non_exhaustive()
    }
}

impl ProvenanceRecorder {
    /// Creates a recorder over `facts`.
    #[must_use]
    pub fn new(facts: Arc<dyn FactQuery>) -> Self {
        Self { facts }
    }

    /// Builds the record for one answer.
    ///
    /// Best effort: a fact-base failure is logged and the record keeps
    /// whatever was gathered before it.
    #[must_use]
    pub fn record(
        &self,
        query: &str,
        answer: &str,
        trace: &[ToolInvocation],
        iteration_count: usize,
        served_from_cache: bool,
    ) -> ProvenanceRecord {
        let cited_entities = self.cite(answer);
        let supporting_facts = self.supporting_facts(&cited_entities);
        let tool_queries_used = raw_queries(trace);
        debug!(
            cited = cited_entities.len(),
            facts = supporting_facts.len(),
            queries = tool_queries_used.len(),
            "provenance recorded"
        );

        ProvenanceRecord {
            query_id: content_hash(query),
            query_text: query.to_string(),
            timestamp: Utc::now(),
            cited_entities,
            supporting_facts,
            tool_queries_used,
            iteration_count,
            served_from_cache,
        }
    }

    fn cite(&self, answer: &str) -> Vec<String> {
        let entities = match self.facts.list_entities(None) {
            Ok(entities) => entities,
            Err(e) => {
                warn!(error = %e, "provenance: entity listing failed");
                return Vec::new();
            }
        };

        let answer = answer.to_lowercase();
        let mut seen = HashSet::new();
        entities
            .into_iter()
            .filter(|entity| {
                !entity.name.is_empty()
                    && (answer.contains(&entity.name.to_lowercase())
                        || abbreviation(&entity.name).is_some_and(|a| answer.contains(&a)))
            })
            .map(|entity| entity.name)
            .filter(|name| seen.insert(name.clone()))
            .take(MAX_CITED)
            .collect()
    }

    fn supporting_facts(&self, cited: &[String]) -> Vec<Triple> {
        let mut seen = HashSet::new();
        let mut facts = Vec::new();

        'entities: for name in cited.iter().take(MAX_DETAILED) {
            let details = match self.facts.entity_details(name) {
                Ok(details) => details,
                Err(e) => {
                    warn!(entity = %name, error = %e, "provenance: detail lookup failed");
                    break;
                }
            };
            for detail in &details {
                if matches!(detail.relation.as_str(), "name" | "description")
                    || detail.relation.is_empty()
                {
                    continue;
                }
                let Some(object) = detail.object() else {
                    continue;
                };
                let triple = Triple {
                    subject: name.clone(),
                    relation: detail.relation.clone(),
                    object: object.to_string(),
                };
                if seen.insert(triple.clone()) {
                    facts.push(triple);
                    if facts.len() == MAX_FACTS {
                        break 'entities;
                    }
                }
            }
        }
        facts
    }
}

/// Literal statements passed to `raw_query`, in trace order.
fn raw_queries(trace: &[ToolInvocation]) -> Vec<String> {
    trace
        .iter()
        .filter(|t| t.tool_name == names::RAW_QUERY)
        .filter_map(|t| t.arguments.get("query").and_then(serde_json::Value::as_str))
        .filter(|q| !q.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::error::FactError;
    use crate::facts::sqlite::tests::seeded_store;
    use crate::facts::{
        AbsorberRow, ArchitectureRow, DefectImpactRow, Entity, EntityDetail, FactSummary, QueryRow,
    };
    use serde_json::json;

    fn recorder() -> ProvenanceRecorder {
        ProvenanceRecorder::new(Arc::new(seeded_store()))
    }

    fn invocation(tool: &str, arguments: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            iteration: 1,
            tool_name: tool.to_string(),
            arguments,
            result_preview: String::new(),
        }
    }

    #[test]
    fn test_abbreviation() {
        assert_eq!(
            abbreviation("Methylammonium Lead Iodide (MAPbI3)").as_deref(),
            Some("mapbi3")
        );
        assert_eq!(abbreviation("PERC"), None);
        assert_eq!(abbreviation("Odd (x)"), None);
    }

    #[test]
    fn test_cites_by_abbreviation_with_facts() {
        let record = recorder().record(
            "Which perovskites are in the graph?",
            "MAPbI3 is a perovskite absorber with a 1.55 eV bandgap.",
            &[invocation(names::KEYWORD_SEARCH, json!({"keyword": "perovskite"}))],
            2,
            false,
        );
        assert_eq!(
            record.cited_entities,
            ["Methylammonium Lead Iodide (MAPbI3)"]
        );
        assert!(
            record
                .supporting_facts
                .iter()
                .any(|f| f.relation == "bandgap_eV" && f.object == "1.55")
        );
        assert!(
            record
                .supporting_facts
                .iter()
                .all(|f| f.relation != "name" && f.relation != "description")
        );
        assert_eq!(record.iteration_count, 2);
        assert!(record.tool_queries_used.is_empty());
        assert_eq!(record.query_id, content_hash("Which perovskites are in the graph?"));
    }

    #[test]
    fn test_absent_entities_are_not_cited() {
        let record = recorder().record("q", "The tandem reaches 33.9 %.", &[], 1, true);
        assert!(record.cited_entities.is_empty());
        assert!(record.supporting_facts.is_empty());
        assert!(record.served_from_cache);
    }

    #[test]
    fn test_full_name_citation_is_case_insensitive() {
        let record = recorder().record(
            "q",
            "the iodide vacancy lowers the open-circuit voltage (voc).",
            &[],
            1,
            false,
        );
        assert!(record.cited_entities.contains(&"Iodide Vacancy".to_string()));
        assert!(
            record
                .cited_entities
                .contains(&"Open-Circuit Voltage (Voc)".to_string())
        );
        assert!(
            record
                .supporting_facts
                .iter()
                .any(|f| f.subject == "Iodide Vacancy" && f.relation == "affectsMetric")
        );
    }

    #[test]
    fn test_raw_queries_in_trace_order() {
        let trace: Vec<ToolInvocation> = (0..7)
            .map(|i| invocation(names::RAW_QUERY, json!({ "query": format!("SELECT {i}") })))
            .chain([invocation(names::ABSORBERS, json!({}))])
            .collect();
        let record = recorder().record("q", "nothing", &trace, 3, false);
        assert_eq!(record.tool_queries_used.len(), 7);
        assert_eq!(record.tool_queries_used[0], "SELECT 0");
        assert_eq!(record.tool_queries_used[6], "SELECT 6");

        let markdown = record.to_markdown();
        assert_eq!(markdown.matches("```sql").count(), MAX_QUERIES);
        assert!(markdown.contains("SELECT 4"));
        assert!(!markdown.contains("SELECT 5"));
    }

    #[test]
    fn test_markdown_sections() {
        let trace = [invocation(
            names::RAW_QUERY,
            json!({ "query": "SELECT name FROM entities" }),
        )];
        let record = recorder().record("q", "PERC cells", &trace, 2, false);
        let md = record.to_markdown();
        assert!(md.starts_with("### Provenance Record"));
        assert!(md.contains("| 1 | PERC |"));
        assert!(md.contains("| PERC | *recordEfficiency_pct* | 24.0 |"));
        assert!(md.contains("```sql\nSELECT name FROM entities\n```"));
    }

    struct BrokenFacts;

    impl FactQuery for BrokenFacts {
        fn list_entities(&self, _: Option<&str>) -> Result<Vec<Entity>, FactError> {
            Ok(vec![Entity {
                name: "PERC".to_string(),
                entity_type: "CellArchitecture".to_string(),
                description: None,
                attributes: std::collections::BTreeMap::new(),
            }])
        }
        fn entity_details(&self, _: &str) -> Result<Vec<EntityDetail>, FactError> {
            Err(FactError::NotReadOnly)
        }
        fn search_by_keyword(&self, _: &str) -> Result<Vec<Entity>, FactError> {
            Ok(Vec::new())
        }
        fn absorbers(&self) -> Result<Vec<AbsorberRow>, FactError> {
            Ok(Vec::new())
        }
        fn architectures(&self) -> Result<Vec<ArchitectureRow>, FactError> {
            Ok(Vec::new())
        }
        fn defects_with_impacts(&self) -> Result<Vec<DefectImpactRow>, FactError> {
            Ok(Vec::new())
        }
        fn relationships(&self) -> Result<Vec<Triple>, FactError> {
            Ok(Vec::new())
        }
        fn summary(&self) -> Result<FactSummary, FactError> {
            Ok(FactSummary::default())
        }
        fn raw_query(&self, _: &str, _: usize) -> Result<Vec<QueryRow>, FactError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_partial_record_on_fact_failure() {
        let recorder = ProvenanceRecorder::new(Arc::new(BrokenFacts));
        let record = recorder.record("q", "PERC", &[], 1, false);
        assert_eq!(record.cited_entities, ["PERC"]);
        assert!(record.supporting_facts.is_empty());
    }
}
