//! Tool `get_recent_activity`: Per-project summaries over a time window.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::MemxResult;

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct ActivityParams {
    #[serde(default = "default_window")]
    window_hours: f64,
}

fn default_window() -> f64 {
    24.0
}

/// Return the tool definition for get_recent_activity.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "get_recent_activity".to_string(),
        description: "Summarize recent interactions across every project, most recently \
             active first, plus any configured external activity sources"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "window_hours": { "type": "number", "exclusiveMinimum": 0.0, "default": 24 }
            }
        }),
    }
}

/// Execute the get_recent_activity tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: ActivityParams = parse_params(args)?;
    let report = engine.recent_activity(params.window_hours)?;
    ToolCallResult::from_serialize(&report)
}
