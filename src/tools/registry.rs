//! Tool registration and dispatch.

use serde_json::Value;

use crate::engine::MemoryEngine;
use crate::types::{MemxError, MemxResult};

use super::{
    add_knowledge_edge, add_knowledge_node, compress_prompt, configure_auto_ingest,
    consolidate_memory, get_auto_ingest_status, get_conversation_history, get_recent_activity,
    ingest_interaction, list_knowledge_nodes, log_interaction, retrieve_memory, snapshot_memory,
    start_new_conversation, traverse_knowledge_graph, ToolCallResult, ToolDefinition,
};

/// Registry of all available tools.
pub struct ToolRegistry;

impl ToolRegistry {
    /// List all available tool definitions.
    pub fn list_tools() -> Vec<ToolDefinition> {
        vec![
            ingest_interaction::definition(),
            log_interaction::definition(),
            retrieve_memory::definition(),
            consolidate_memory::definition(),
            add_knowledge_node::definition(),
            add_knowledge_edge::definition(),
            traverse_knowledge_graph::definition(),
            compress_prompt::definition(),
            snapshot_memory::definition(),
            get_recent_activity::definition(),
            configure_auto_ingest::definition(),
            get_auto_ingest_status::definition(),
            start_new_conversation::definition(),
            // Read-only views
            get_conversation_history::definition(),
            list_knowledge_nodes::definition(),
        ]
    }

    /// Dispatch a tool call to the appropriate handler.
    pub fn call(
        name: &str,
        arguments: Option<Value>,
        engine: &MemoryEngine,
    ) -> MemxResult<ToolCallResult> {
        let args = match arguments {
            None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
            Some(args) => args,
        };
        log::debug!("Tool call: {name}");

        match name {
            "ingest_interaction" => ingest_interaction::execute(args, engine),
            "log_interaction" => log_interaction::execute(args, engine),
            "retrieve_memory" => retrieve_memory::execute(args, engine),
            "consolidate_memory" => consolidate_memory::execute(args, engine),
            "add_knowledge_node" => add_knowledge_node::execute(args, engine),
            "add_knowledge_edge" => add_knowledge_edge::execute(args, engine),
            "traverse_knowledge_graph" => traverse_knowledge_graph::execute(args, engine),
            "compress_prompt" => compress_prompt::execute(args, engine),
            "snapshot_memory" => snapshot_memory::execute(args, engine),
            "get_recent_activity" => get_recent_activity::execute(args, engine),
            "configure_auto_ingest" => configure_auto_ingest::execute(args, engine),
            "get_auto_ingest_status" => get_auto_ingest_status::execute(args, engine),
            "start_new_conversation" => start_new_conversation::execute(args, engine),
            "get_conversation_history" => get_conversation_history::execute(args, engine),
            "list_knowledge_nodes" => list_knowledge_nodes::execute(args, engine),
            _ => Err(MemxError::ToolNotFound(name.to_string())),
        }
    }
}
