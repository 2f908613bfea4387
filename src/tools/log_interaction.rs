//! Tool `log_interaction`: Append to the current project's conversation.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, parse_role, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct LogParams {
    content: String,
    #[serde(default)]
    role: Option<String>,
}

/// Return the tool definition for log_interaction.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "log_interaction".to_string(),
        description: "Log a message into the active conversation of the current project. \
             The conversation is resolved automatically; role defaults to user"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "role": {
                    "type": "string",
                    "enum": ["user", "assistant", "system", "tool"],
                    "default": "user"
                }
            },
            "required": ["content"]
        }),
    }
}

/// Execute the log_interaction tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: LogParams = parse_params(args)?;
    let role = parse_role(params.role.as_deref())?;
    let result = engine.log_interaction(&params.content, Some(role))?;
    Ok(ToolCallResult::json(json!({
        "id": result.id,
        "conversation_id": result.conversation_id,
        "surprise_score": result.surprise_score,
    })))
}
