//! Tool `get_conversation_history`: Recent interactions and digest of a conversation.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct HistoryParams {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Return the tool definition for get_conversation_history.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "get_conversation_history".to_string(),
        description: "Return the last interactions of a conversation, oldest first, \
             together with the digest of everything summarized so far"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "conversation_id": { "type": "string", "description": "Defaults to the current project's" },
                "limit": { "type": "integer", "minimum": 1, "default": 20 }
            }
        }),
    }
}

/// Execute the get_conversation_history tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: HistoryParams = parse_params(args)?;
    let conversation = params.conversation_id.as_deref();
    let interactions = engine.recent(conversation, params.limit)?;
    let digest = engine.digest(conversation)?;
    Ok(ToolCallResult::json(json!({
        "interactions": serde_json::to_value(&interactions)?,
        "digest": digest,
    })))
}
