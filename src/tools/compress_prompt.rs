//! Tool `compress_prompt`: Shrink text to a target ratio.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct CompressParams {
    text: String,
    #[serde(default = "default_ratio")]
    target_ratio: f32,
    #[serde(default)]
    instruction: Option<String>,
}

fn default_ratio() -> f32 {
    0.5
}

/// Return the tool definition for compress_prompt.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "compress_prompt".to_string(),
        description: "Compress long context before it goes into a prompt. Sentences related \
             to the optional instruction are kept first"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "target_ratio": {
                    "type": "number",
                    "exclusiveMinimum": 0.0,
                    "maximum": 1.0,
                    "default": 0.5
                },
                "instruction": { "type": "string", "description": "What the compressed text will be used for" }
            },
            "required": ["text"]
        }),
    }
}

/// Execute the compress_prompt tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: CompressParams = parse_params(args)?;
    let compression = engine.compress_prompt(
        &params.text,
        params.target_ratio,
        params.instruction.as_deref(),
    )?;
    ToolCallResult::from_serialize(&compression)
}
