//! Tool `ingest_interaction`: Score and append an interaction to a conversation.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, parse_role, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct IngestParams {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    role: Option<String>,
    content: String,
}

/// Return the tool definition for ingest_interaction.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "ingest_interaction".to_string(),
        description: "Record one interaction in episodic memory and return its surprise score. \
             Without a conversation_id the current project's active conversation is used"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "conversation_id": {
                    "type": "string",
                    "description": "Target conversation; defaults to the current project's"
                },
                "role": {
                    "type": "string",
                    "enum": ["user", "assistant", "system", "tool"],
                    "default": "user"
                },
                "content": { "type": "string", "description": "Interaction text" }
            },
            "required": ["content"]
        }),
    }
}

/// Execute the ingest_interaction tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: IngestParams = parse_params(args)?;
    let role = parse_role(params.role.as_deref())?;
    let result = engine.ingest(params.conversation_id.as_deref(), role, &params.content)?;
    ToolCallResult::from_serialize(&result)
}
