//! Tool `start_new_conversation`: Archive the active conversation and open a fresh one.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct StartParams {
    #[serde(default)]
    project_key: Option<String>,
}

/// Return the tool definition for start_new_conversation.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "start_new_conversation".to_string(),
        description: "Start a new conversation for a project. The previous one is archived \
             and stays searchable as past context"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "project_key": { "type": "string", "description": "Defaults to the current project" }
            }
        }),
    }
}

/// Execute the start_new_conversation tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: StartParams = parse_params(args)?;
    let resolved = engine.start_new_conversation(params.project_key.as_deref())?;
    Ok(ToolCallResult::json(json!({
        "conversation_id": resolved.conversation_id,
        "project_key": resolved.project_key,
    })))
}
