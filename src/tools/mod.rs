//! Tool surface: the request/response operations agents call.
//!
//! Each tool lives in its own module exposing `definition()` (name,
//! description, JSON schema) and `execute(args, engine)`. [`ToolRegistry`]
//! lists and dispatches them; [`ToolInvoker`] is the narrow capability
//! interface an agent integration is written against.

pub mod add_knowledge_edge;
pub mod add_knowledge_node;
pub mod compress_prompt;
pub mod configure_auto_ingest;
pub mod consolidate_memory;
pub mod get_auto_ingest_status;
pub mod get_conversation_history;
pub mod get_recent_activity;
pub mod ingest_interaction;
pub mod list_knowledge_nodes;
pub mod log_interaction;
pub mod registry;
pub mod retrieve_memory;
pub mod snapshot_memory;
pub mod start_new_conversation;
pub mod traverse_knowledge_graph;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::MemoryEngine;
use crate::types::{MemxError, MemxResult, NodeRef, Role};

pub use registry::ToolRegistry;

/// Name, description and input schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Outcome of a tool call. Failures carry `{"error": {"kind", "message"}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallResult {
    pub content: Value,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Successful result wrapping a JSON payload.
    pub fn json(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Serialize any payload into a successful result.
    pub fn from_serialize<T: Serialize>(payload: &T) -> MemxResult<Self> {
        Ok(Self::json(serde_json::to_value(payload)?))
    }

    /// Structured failure for `err`.
    pub fn failure(err: &MemxError) -> Self {
        Self {
            content: json!({
                "error": {
                    "kind": err.kind(),
                    "message": err.to_string(),
                }
            }),
            is_error: true,
        }
    }
}

/// The capability interface agent integrations call through. Nothing on the
/// engine side knows which agent is on the other end.
pub trait ToolInvoker {
    /// Every tool this invoker can run.
    fn list_tools(&self) -> Vec<ToolDefinition>;

    /// Run `name` with `arguments`. Never fails: errors come back as
    /// structured failure results.
    fn invoke(&self, name: &str, arguments: Option<Value>) -> ToolCallResult;
}

impl ToolInvoker for MemoryEngine {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        ToolRegistry::list_tools()
    }

    fn invoke(&self, name: &str, arguments: Option<Value>) -> ToolCallResult {
        match ToolRegistry::call(name, arguments, self) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Tool {name} failed: {e}");
                ToolCallResult::failure(&e)
            }
        }
    }
}

/// Decode tool arguments, reporting shape errors as validation failures.
pub(crate) fn parse_params<T: DeserializeOwned>(args: Value) -> MemxResult<T> {
    serde_json::from_value(args).map_err(|e| MemxError::Validation(format!("invalid arguments: {e}")))
}

/// A node named by id (JSON number) or label (JSON string).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum NodeArg {
    Id(u64),
    Label(String),
}

impl From<NodeArg> for NodeRef {
    fn from(arg: NodeArg) -> Self {
        match arg {
            NodeArg::Id(id) => NodeRef::Id(id),
            NodeArg::Label(label) => NodeRef::Label(label),
        }
    }
}

/// Parse an optional role name; absent means `user`.
pub(crate) fn parse_role(name: Option<&str>) -> MemxResult<Role> {
    match name {
        None => Ok(Role::User),
        Some(name) => Role::from_name(name).ok_or_else(|| {
            MemxError::Validation(format!(
                "unknown role '{name}' (expected user, assistant, system or tool)"
            ))
        }),
    }
}

/// Schema fragment for a node given by id or label.
pub(crate) fn node_ref_schema(description: &str) -> Value {
    json!({
        "oneOf": [
            { "type": "integer", "minimum": 0 },
            { "type": "string", "minLength": 1 }
        ],
        "description": description
    })
}
