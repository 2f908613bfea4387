//! Tool `configure_auto_ingest`: Control automatic logging of retrievals.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct ConfigureParams {
    #[serde(default)]
    project_key: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    log_queries: Option<bool>,
    #[serde(default)]
    log_responses: Option<bool>,
}

/// Return the tool definition for configure_auto_ingest.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "configure_auto_ingest".to_string(),
        description: "Enable or disable automatic logging of queries and responses. \
             log_queries/log_responses override the global switch for one project"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "project_key": { "type": "string", "description": "Defaults to the current project" },
                "enabled": { "type": "boolean", "description": "Global switch" },
                "log_queries": { "type": "boolean" },
                "log_responses": { "type": "boolean" }
            }
        }),
    }
}

/// Execute the configure_auto_ingest tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: ConfigureParams = parse_params(args)?;
    let status = engine.configure_auto_ingest(
        params.project_key.as_deref(),
        params.enabled,
        params.log_queries,
        params.log_responses,
    )?;
    ToolCallResult::from_serialize(&status)
}
