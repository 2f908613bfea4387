//! Tool `traverse_knowledge_graph`: Breadth-first paths from a node.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::{MemxResult, DEFAULT_TRAVERSAL_HOPS, MAX_TRAVERSAL_HOPS};

use super::{node_ref_schema, parse_params, NodeArg, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct TraverseParams {
    start: NodeArg,
    #[serde(default)]
    max_hops: Option<u32>,
    #[serde(default)]
    min_weight: Option<f32>,
}

/// Return the tool definition for traverse_knowledge_graph.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "traverse_knowledge_graph".to_string(),
        description: "Walk outgoing relations from a node. Each reachable node is returned \
             once, with the shortest path leading to it"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "start": node_ref_schema("Start node id or label"),
                "max_hops": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TRAVERSAL_HOPS,
                    "default": DEFAULT_TRAVERSAL_HOPS
                },
                "min_weight": { "type": "number", "minimum": 0.0, "maximum": 1.0, "default": 0.0 }
            },
            "required": ["start"]
        }),
    }
}

/// Execute the traverse_knowledge_graph tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: TraverseParams = parse_params(args)?;
    let paths = engine.traverse(&params.start.into(), params.max_hops, params.min_weight)?;
    Ok(ToolCallResult::json(json!({
        "count": paths.len(),
        "paths": serde_json::to_value(&paths)?,
    })))
}
