//! Tool `snapshot_memory`: Checkpoint the whole memory state.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    message: String,
}

/// Return the tool definition for snapshot_memory.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "snapshot_memory".to_string(),
        description: "Archive the current memory state under a message and return its reference"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "minLength": 1 }
            },
            "required": ["message"]
        }),
    }
}

/// Execute the snapshot_memory tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: SnapshotParams = parse_params(args)?;
    let snapshot = engine.snapshot(&params.message)?;
    ToolCallResult::from_serialize(&snapshot)
}
