//! Tool `add_knowledge_edge`: Assert a relation between two nodes.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{node_ref_schema, parse_params, NodeArg, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct AddEdgeParams {
    from: NodeArg,
    to: NodeArg,
    relation: String,
    #[serde(default = "default_weight")]
    weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

/// Return the tool definition for add_knowledge_edge.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "add_knowledge_edge".to_string(),
        description: "Relate two existing nodes (by id or label). Re-asserting an edge keeps \
             the higher weight"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "from": node_ref_schema("Source node id or label"),
                "to": node_ref_schema("Target node id or label"),
                "relation": { "type": "string", "minLength": 1 },
                "weight": { "type": "number", "minimum": 0.0, "maximum": 1.0, "default": 1.0 }
            },
            "required": ["from", "to", "relation"]
        }),
    }
}

/// Execute the add_knowledge_edge tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: AddEdgeParams = parse_params(args)?;
    let result = engine.add_knowledge_edge(
        &params.from.into(),
        &params.to.into(),
        &params.relation,
        params.weight,
    )?;
    ToolCallResult::from_serialize(&result)
}
