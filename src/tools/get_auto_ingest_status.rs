//! Tool `get_auto_ingest_status`: Effective auto-ingest settings for a project.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct StatusParams {
    #[serde(default)]
    project_key: Option<String>,
}

/// Return the tool definition for get_auto_ingest_status.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "get_auto_ingest_status".to_string(),
        description: "Show whether queries and responses are logged automatically for a project"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "project_key": { "type": "string", "description": "Defaults to the current project" }
            }
        }),
    }
}

/// Execute the get_auto_ingest_status tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: StatusParams = parse_params(args)?;
    let status = engine.auto_ingest_status(params.project_key.as_deref())?;
    ToolCallResult::from_serialize(&status)
}
