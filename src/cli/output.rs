//! Output formatting for CLI commands.
//!
//! Every command renders either human-readable text or pretty JSON.

use std::fmt::Write as _;

use serde::Serialize;

use crate::agent::reasoning::ToolInvocation;
use crate::facts::{Entity, EntityDetail, FactSummary};
use crate::service::{ReasonedAnswer, ServiceCacheStats};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognized is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON with a trailing newline.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value).map_or_else(
            |e| format!("{{\"error\": \"serialization failed: {e}\"}}\n"),
            |s| s + "\n",
        )
    }
}

/// Renders fact-base counts.
#[must_use]
pub fn format_summary(summary: &FactSummary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(summary),
        OutputFormat::Text => {
            let mut out = String::from("Fact base\n");
            let _ = writeln!(out, "  Facts:     {}", summary.total_facts);
            let _ = writeln!(out, "  Entities:  {}", summary.entity_count);
            let _ = writeln!(out, "  Relations: {}", summary.relation_count);
            if !summary.by_type.is_empty() {
                out.push_str("\nEntities by type\n");
                let width = summary.by_type.keys().map(String::len).max().unwrap_or(0);
                for (entity_type, count) in &summary.by_type {
                    let _ = writeln!(out, "  {entity_type:<width$}  {count}");
                }
            }
            out
        }
    }
}

/// Renders a list of entities.
#[must_use]
pub fn format_entities(entities: &[Entity], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(entities),
        OutputFormat::Text => {
            if entities.is_empty() {
                return "No matching entities.\n".to_string();
            }
            let mut out = String::new();
            for entity in entities {
                let _ = write!(out, "{} ({})", entity.name, entity.entity_type);
                if let Some(description) = &entity.description {
                    let _ = write!(out, ": {description}");
                }
                out.push('\n');
                for (key, value) in &entity.attributes {
                    let _ = writeln!(out, "    {key}: {value}");
                }
            }
            out
        }
    }
}

/// Renders an entity's attributes and relations.
#[must_use]
pub fn format_entity_details(name: &str, details: &[EntityDetail], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "entity": name,
            "details": details,
        })),
        OutputFormat::Text => {
            let mut out = format!("{name}\n");
            for detail in details {
                let object = detail.object().unwrap_or("-");
                let arrow = if detail.target_name.is_some() { "→" } else { ":" };
                let _ = writeln!(out, "  {} {arrow} {object}", detail.relation);
            }
            out
        }
    }
}

/// Renders cache counters.
#[must_use]
pub fn format_cache_stats(stats: &ServiceCacheStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(stats),
        OutputFormat::Text => {
            let a = &stats.answers;
            let mut out = String::from("Answer cache\n");
            let _ = writeln!(out, "  Persisted answers: {}", a.persistent_count);
            let _ = writeln!(out, "  TTL:               {}s", a.ttl_seconds);
            out.push_str("Context cache\n");
            let _ = writeln!(
                out,
                "  Size:              {}/{}",
                a.in_memory_size, a.in_memory_capacity
            );
            let _ = writeln!(
                out,
                "  Hits / misses:     {} / {}",
                a.in_memory_hits, a.in_memory_misses
            );
            out.push_str("Reasoning cache\n");
            let _ = writeln!(out, "  Sessions:          {}", stats.reasoning_entries);
            let _ = writeln!(out, "  Max iterations:    {}", stats.max_iterations);
            out
        }
    }
}

/// Renders a reasoning answer, its provenance and optionally its trace.
#[must_use]
pub fn format_reasoned(
    reasoned: &ReasonedAnswer,
    show_trace: bool,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => format.to_json(reasoned),
        OutputFormat::Text => {
            let outcome = &reasoned.outcome;
            let mut out = outcome.answer.clone();
            out.push_str("\n\n---\n");
            let _ = writeln!(
                out,
                "Stop: {} | Iterations: {} | Tool calls: {}{}",
                outcome.stop_reason,
                outcome.iteration_count,
                outcome.trace.len(),
                if outcome.served_from_cache { " | cached" } else { "" }
            );
            if show_trace && !outcome.trace.is_empty() {
                out.push('\n');
                out.push_str(&format_trace(&outcome.trace));
            }
            out.push('\n');
            out.push_str(&reasoned.provenance.to_markdown());
            out
        }
    }
}

fn format_trace(trace: &[ToolInvocation]) -> String {
    let mut out = String::from("Trace\n");
    for step in trace {
        let _ = writeln!(
            out,
            "  [{}] {} {}",
            step.iteration, step.tool_name, step.arguments
        );
        for line in step.result_preview.lines().take(4) {
            let _ = writeln!(out, "      {line}");
        }
    }
    out
}
