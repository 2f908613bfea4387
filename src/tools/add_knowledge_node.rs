//! Tool `add_knowledge_node`: Assert an entity in the knowledge graph.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct AddNodeParams {
    label: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

/// Return the tool definition for add_knowledge_node.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "add_knowledge_node".to_string(),
        description: "Add an entity to the knowledge graph, or merge attributes into the \
             node with the same label. The assertion is logged as its provenance"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "minLength": 1 },
                "description": { "type": "string", "description": "Stored as the 'description' attribute" },
                "attributes": { "type": "object", "additionalProperties": true }
            },
            "required": ["label"]
        }),
    }
}

/// Execute the add_knowledge_node tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: AddNodeParams = parse_params(args)?;
    let mut attributes = params.attributes;
    if let Some(description) = params.description {
        attributes.insert("description".to_string(), Value::String(description));
    }
    let result = engine.add_knowledge_node(&params.label, attributes)?;
    ToolCallResult::from_serialize(&result)
}
