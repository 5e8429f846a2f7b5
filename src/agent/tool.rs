//! Tool definitions for the reasoning agent.
//!
//! Every tool is a read-only operation on the fact base. The set is fixed;
//! the executor's dispatch table must name the same tools.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tool names, shared with the executor's dispatch table.
pub mod names {
    /// Bounded raw query against the fact store.
    pub const RAW_QUERY: &str = "raw_query";
    /// All details of one entity.
    pub const ENTITY_DETAILS: &str = "get_entity_details";
    /// Keyword search over names and descriptions.
    pub const KEYWORD_SEARCH: &str = "keyword_search";
    /// Absorber listing.
    pub const ABSORBERS: &str = "get_absorbers";
    /// Architecture listing.
    pub const ARCHITECTURES: &str = "get_architectures";
    /// Defects with impacted metrics.
    pub const DEFECTS: &str = "get_defects";
    /// Relationship dump.
    pub const RELATIONSHIPS: &str = "get_relationships";
}

/// A tool definition sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match the executor's dispatch table).
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the provider.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the call this result answers.
    pub tool_call_id: String,
    /// JSON observation (an `{"error": ...}` object on failure).
    pub content: String,
    /// Whether this result is an error observation.
    pub is_error: bool,
}

/// A set of tool definitions.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    definitions: Vec<ToolDefinition>,
}

impl ToolSet {
    /// Returns the tool definitions in this set.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns `true` if this set contains no tools.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns the number of tools in this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if a tool with `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name == name)
    }

    /// The seven fact-base tools offered to the reasoning agent.
    #[must_use]
    pub fn reasoning_tools() -> Self {
        Self {
            definitions: vec![
                def_raw_query(),
                def_entity_details(),
                def_keyword_search(),
                def_no_args(
                    names::ABSORBERS,
                    "List all absorber materials with bandgap (eV) and crystal structure, \
                     ordered by bandgap.",
                ),
                def_no_args(
                    names::ARCHITECTURES,
                    "List all solar cell architectures with their record power conversion \
                     efficiency (%), best first.",
                ),
                def_no_args(
                    names::DEFECTS,
                    "List defects and the performance metrics each one affects.",
                ),
                def_no_args(
                    names::RELATIONSHIPS,
                    "List relations between entities (material used in architecture, \
                     defect affects metric, and so on).",
                ),
            ],
        }
    }

    /// Empty tool set.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

fn def_raw_query() -> ToolDefinition {
    ToolDefinition {
        name: names::RAW_QUERY.to_string(),
        description: "Run a read-only SQL SELECT against the fact base. Tables: \
                      entities(id, name, type, description), attributes(entity_id, key, value), \
                      relations(subject_id, predicate, object_id). At most 40 rows are returned."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A single read-only SQL statement."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_entity_details() -> ToolDefinition {
    ToolDefinition {
        name: names::ENTITY_DETAILS.to_string(),
        description: "Get every attribute and relation of one entity by exact name."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "entity_name": {
                    "type": "string",
                    "description": "Exact entity name, e.g. \"Crystalline Silicon (c-Si)\"."
                }
            },
            "required": ["entity_name"],
            "additionalProperties": false
        }),
    }
}

fn def_keyword_search() -> ToolDefinition {
    ToolDefinition {
        name: names::KEYWORD_SEARCH.to_string(),
        description: "Case-insensitive search over entity names and descriptions. \
                      Returns at most 20 matches."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "keyword": {
                    "type": "string",
                    "description": "Word or phrase to look for."
                }
            },
            "required": ["keyword"],
            "additionalProperties": false
        }),
    }
}

fn def_no_args(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_tools() {
        let ts = ToolSet::reasoning_tools();
        assert_eq!(ts.len(), 7);
        for name in [
            names::RAW_QUERY,
            names::ENTITY_DETAILS,
            names::KEYWORD_SEARCH,
            names::ABSORBERS,
            names::ARCHITECTURES,
            names::DEFECTS,
            names::RELATIONSHIPS,
        ] {
            assert!(ts.contains(name), "missing {name}");
        }
        assert!(!ts.contains("sparql_update"));
    }

    #[test]
    fn test_toolset_none() {
        assert!(ToolSet::none().is_empty());
    }

    #[test]
    fn test_all_definitions_have_object_schemas() {
        for def in ToolSet::reasoning_tools().definitions() {
            assert!(!def.description.is_empty());
            assert_eq!(def.parameters["type"], "object");
        }
    }
}
