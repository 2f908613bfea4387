//! Tool `consolidate_memory`: Run the sleep cycle over one or all conversations.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ConsolidationPolicy;
use crate::engine::MemoryEngine;
use crate::types::{MemxError, MemxResult};

use super::{parse_params, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct ConsolidateParams {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    t_high: Option<f32>,
    #[serde(default)]
    t_low: Option<f32>,
    #[serde(default)]
    retention_age_secs: Option<u64>,
    #[serde(default)]
    prune_age_secs: Option<u64>,
}

impl ConsolidateParams {
    /// All four policy fields, or none (use the configured policy).
    fn policy(&self) -> MemxResult<Option<ConsolidationPolicy>> {
        match (
            self.t_high,
            self.t_low,
            self.retention_age_secs,
            self.prune_age_secs,
        ) {
            (None, None, None, None) => Ok(None),
            (Some(t_high), Some(t_low), Some(retention_age_secs), Some(prune_age_secs)) => {
                Ok(Some(ConsolidationPolicy {
                    t_high,
                    t_low,
                    retention_age_secs,
                    prune_age_secs,
                }))
            }
            _ => Err(MemxError::Validation(
                "policy override needs all of t_high, t_low, retention_age_secs and prune_age_secs"
                    .to_string(),
            )),
        }
    }
}

/// Return the tool definition for consolidate_memory.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "consolidate_memory".to_string(),
        description: "Promote surprising interactions into the knowledge graph, summarize \
             or prune stale ones. Omit conversation_id to consolidate every conversation. \
             Policy fields override the configured policy and must be given together"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "conversation_id": { "type": "string" },
                "t_high": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "t_low": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "retention_age_secs": { "type": "integer", "minimum": 0 },
                "prune_age_secs": { "type": "integer", "minimum": 0 }
            }
        }),
    }
}

/// Execute the consolidate_memory tool.
pub fn execute(args: Value, engine: &MemoryEngine) -> MemxResult<ToolCallResult> {
    let params: ConsolidateParams = parse_params(args)?;
    let policy = params.policy()?;
    let report = engine.consolidate(params.conversation_id.as_deref(), policy)?;
    ToolCallResult::from_serialize(&report)
}
