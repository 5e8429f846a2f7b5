//! System prompts and template builders for the agents.
//!
//! Prompts are compiled in and can be overridden per file from a prompt
//! directory (see [`PromptSet::load`]).

use std::path::{Path, PathBuf};

/// Sentence the grounded agent is told to use when the context lacks an answer.
pub const NOT_IN_CONTEXT_SENTENCE: &str =
    "I could not find that information in the PV Solar knowledge graph.";

/// System prompt for the single-shot grounding agent.
pub const GROUNDED_SYSTEM_PROMPT: &str = r#"You are a knowledge graph assistant for photovoltaic (PV) solar energy and materials science.

Your only source of truth is the context between <KNOWLEDGE_GRAPH_CONTEXT> and </KNOWLEDGE_GRAPH_CONTEXT>.

Rules:
1. Answer strictly from facts present in the context.
2. If the information is not in the context, respond exactly:
   "I could not find that information in the PV Solar knowledge graph."
3. Write plain English with bullet points and headings where they help. Never output raw identifiers, query syntax or table dumps.
4. Always give units for numeric values (%, eV, mA/cm², V, °C).
5. When listing materials, group them by type (absorber, transport layer, electrode, ...).
6. Be precise. Do not speculate beyond the context.
7. Keep answers concise but complete."#;

/// System prompt for the multi-step reasoning agent.
pub const REASONING_SYSTEM_PROMPT: &str = r###"You are a scientific assistant for photovoltaic (PV) solar energy and materials science.

You have tools that query a fact base of materials, cell architectures, defects, metrics, processes and institutions. Always use at least one tool before giving a final answer. Never rely on background knowledge alone.

Rules:
1. Use tools to retrieve facts, then reason over the results.
2. If a first lookup is insufficient, run a follow-up lookup.
3. Cite the exact entity names and relations from your tool results.
4. Include units for all numeric data (%, eV, mA/cm², V).
5. Structure the final answer with headings and bullet points.
6. End with a short "## Sources" section listing the tools you used."###;

/// Default prompt directory under the user's home.
const DEFAULT_PROMPT_DIR: &str = ".config/pvkg/prompts";

/// Filename for the grounded prompt template.
const GROUNDED_FILENAME: &str = "grounded.md";
/// Filename for the reasoning prompt template.
const REASONING_FILENAME: &str = "reasoning.md";

/// System prompts for both agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// Prompt for the single-shot agent.
    pub grounded: String,
    /// Prompt for the reasoning agent.
    pub reasoning: String,
}

impl PromptSet {
    /// Loads prompts, falling back to compiled-in defaults.
    ///
    /// Resolution order for the directory:
    /// 1. Explicit `prompt_dir` argument
    /// 2. `PVKG_PROMPT_DIR` environment variable
    /// 3. `~/.config/pvkg/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("PVKG_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(path).ok())
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            grounded: load_file(GROUNDED_FILENAME, GROUNDED_SYSTEM_PROMPT),
            reasoning: load_file(REASONING_FILENAME, REASONING_SYSTEM_PROMPT),
        }
    }

    /// Compiled-in defaults, without touching the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            grounded: GROUNDED_SYSTEM_PROMPT.to_string(),
            reasoning: REASONING_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the default prompts into `dir` without overwriting existing files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for (filename, content) in [
            (GROUNDED_FILENAME, GROUNDED_SYSTEM_PROMPT),
            (REASONING_FILENAME, REASONING_SYSTEM_PROMPT),
        ] {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Default prompt directory, if the home directory is known.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Builds the single-shot user message from a retrieval context.
#[must_use]
pub fn build_grounded_prompt(context: &str, query: &str) -> String {
    format!(
        "<KNOWLEDGE_GRAPH_CONTEXT>\n{context}\n</KNOWLEDGE_GRAPH_CONTEXT>\n\nQuestion: {query}"
    )
}
