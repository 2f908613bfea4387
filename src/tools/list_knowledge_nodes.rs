//! Tool `list_knowledge_nodes`: Dump the knowledge graph.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    include_edges: bool,
}

/// Return the tool definition for list_knowledge_nodes.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "list_knowledge_nodes".to_string(),
        description: "List every knowledge graph node, optionally with all edges".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "include_edges": { "type": "boolean", "default": false }
            }
        }),
    }
}

/// Execute the list_knowledge_nodes tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: ListParams = parse_params(args)?;
    let nodes = engine.nodes();
    let mut payload = json!({
        "count": nodes.len(),
        "nodes": serde_json::to_value(&nodes)?,
    });
    if params.include_edges {
        payload["edges"] = serde_json::to_value(engine.edges())?;
    }
    Ok(ToolCallResult::json(payload))
}
