//! Tool `retrieve_memory`: Ranked episodic and graph evidence for a query.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct RetrieveParams {
    query: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Return the tool definition for retrieve_memory.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "retrieve_memory".to_string(),
        description: "Search memory for a query. Returns items from the current conversation, \
             past conversations and the knowledge graph, highest score first"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "conversation_id": {
                    "type": "string",
                    "description": "Conversation treated as current; defaults to the project's active one"
                },
                "top_k": { "type": "integer", "minimum": 1, "description": "Maximum items returned" }
            },
            "required": ["query"]
        }),
    }
}

/// Execute the retrieve_memory tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: RetrieveParams = parse_params(args)?;
    let result = engine.retrieve(
        &params.query,
        params.conversation_id.as_deref(),
        params.top_k,
    )?;
    ToolCallResult::from_serialize(&result)
}
