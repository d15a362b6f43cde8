//! MCP tool definitions for Durandal

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The four tool descriptors: (name, description, input schema)
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "store_memory",
        "Store a memory with structured metadata. PROACTIVE: store user preferences, decisions, and project context as they come up.",
        r#"{
            "type": "object",
            "properties": {
                "content": {"type": "string", "minLength": 1, "description": "The content to remember"},
                "metadata": {
                    "type": "object",
                    "description": "Structured metadata; unrecognized fields are preserved",
                    "properties": {
                        "importance": {"type": "number", "minimum": 0, "maximum": 1, "default": 0.5},
                        "categories": {"type": "array", "items": {"type": "string"}},
                        "keywords": {"type": "array", "items": {"type": "string"}},
                        "project": {"type": "string"},
                        "session": {"type": "string"}
                    }
                }
            },
            "required": ["content"]
        }"#,
    ),
    (
        "search_memories",
        "Search stored memories by text. Results are ranked by relevance against the query and recent conversation context.",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 10},
                "filters": {
                    "type": "object",
                    "properties": {
                        "minImportance": {"type": "number", "minimum": 0, "maximum": 1},
                        "categories": {"type": "array", "items": {"type": "string"}},
                        "project": {"type": "string"},
                        "session": {"type": "string"}
                    }
                }
            },
            "required": ["query"]
        }"#,
    ),
    (
        "get_context",
        "Get recent memories plus lightweight store statistics, optionally scoped to a session.",
        r#"{
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "Session name to scope recent memories to"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 10}
            }
        }"#,
    ),
    (
        "optimize_memory",
        "Run store maintenance: compaction and index refresh. Aggressive mode additionally decays importance, prunes stale low-value rows, and rebuilds the cache.",
        r#"{
            "type": "object",
            "properties": {
                "aggressive": {"type": "boolean", "default": false}
            }
        }"#,
    ),
];

/// Parse the tool table into definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).expect("tool schema is valid JSON"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_four_tools() {
        let tools = get_tool_definitions();
        assert_eq!(tools.len(), 4);
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["store_memory", "search_memories", "get_context", "optimize_memory"]
        );
    }

    #[test]
    fn schemas_parse_and_declare_required_fields() {
        let tools = get_tool_definitions();
        assert_eq!(tools[0].input_schema["required"][0], "content");
        assert_eq!(tools[1].input_schema["required"][0], "query");
        assert_eq!(tools[1].input_schema["properties"]["limit"]["maximum"], 100);
    }
}
