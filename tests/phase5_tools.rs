//! Phase 5 tests: tool surface, stdio transport, snapshots, activity and CLI.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::TempDir;

use memx::services::snapshot::read_bundle;
use memx::services::ArchiveSnapshotter;
use memx::transport::StdioTransport;
use memx::{EngineConfig, MemoryEngine, StoreLayout, ToolInvoker, ToolRegistry};

fn open(dir: &TempDir) -> MemoryEngine {
    let config = EngineConfig::for_root(dir.path()).with_project_key("/projects/alpha");
    MemoryEngine::open(config).unwrap()
}

fn ok(engine: &MemoryEngine, tool: &str, args: Value) -> Value {
    let result = engine.invoke(tool, Some(args));
    assert!(!result.is_error, "{tool} failed: {}", result.content);
    result.content
}

fn error_kind(engine: &MemoryEngine, tool: &str, args: Value) -> String {
    let result = engine.invoke(tool, Some(args));
    assert!(result.is_error, "{tool} unexpectedly succeeded");
    result.content["error"]["kind"].as_str().unwrap().to_string()
}

// ==================== Tool Listing ====================

#[test]
fn test_tool_listing() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let tools = engine.list_tools();
    let names: BTreeSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    for expected in [
        "ingest_interaction",
        "log_interaction",
        "retrieve_memory",
        "consolidate_memory",
        "add_knowledge_node",
        "add_knowledge_edge",
        "traverse_knowledge_graph",
        "compress_prompt",
        "snapshot_memory",
        "get_recent_activity",
        "configure_auto_ingest",
        "get_auto_ingest_status",
        "start_new_conversation",
    ] {
        assert!(names.contains(expected), "missing {expected}");
    }
    assert_eq!(tools.len(), ToolRegistry::list_tools().len());

    let serialized = serde_json::to_value(&tools[0]).unwrap();
    assert!(serialized.get("inputSchema").is_some());
}

// ==================== Dispatch ====================

#[test]
fn test_ingest_and_retrieve_through_tools() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let ingested = ok(
        &engine,
        "ingest_interaction",
        json!({"role": "assistant", "content": "the flaky test was a timezone bug"}),
    );
    assert_eq!(ingested["surprise_score"], 1.0);
    let conversation = ingested["conversation_id"].as_str().unwrap().to_string();

    let logged = ok(
        &engine,
        "log_interaction",
        json!({"content": "confirmed: timezone bug in the date parser"}),
    );
    assert_eq!(logged["conversation_id"], conversation.as_str());

    let retrieved = ok(
        &engine,
        "retrieve_memory",
        json!({"query": "timezone bug", "top_k": 2}),
    );
    let items = retrieved["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["source"], "episodic:current");

    let history = ok(
        &engine,
        "get_conversation_history",
        json!({"conversation_id": conversation, "limit": 10}),
    );
    assert_eq!(history["interactions"].as_array().unwrap().len(), 2);
    assert_eq!(history["interactions"][0]["role"], "assistant");
}

#[test]
fn test_structured_errors() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    assert_eq!(
        error_kind(&engine, "ingest_interaction", json!({"content": "   "})),
        "validation_error"
    );
    assert_eq!(
        error_kind(&engine, "ingest_interaction", json!({"role": "robot", "content": "x"})),
        "validation_error"
    );
    assert_eq!(
        error_kind(&engine, "ingest_interaction", json!({"wrong": true})),
        "validation_error"
    );
    assert_eq!(
        error_kind(
            &engine,
            "ingest_interaction",
            json!({"conversation_id": "conv_missing", "content": "x"})
        ),
        "not_found_error"
    );
    assert_eq!(
        error_kind(&engine, "no_such_tool", json!({})),
        "tool_not_found"
    );
}

#[test]
fn test_missing_arguments_default_to_empty_object() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let result = engine.invoke("get_auto_ingest_status", None);
    assert!(!result.is_error);
    assert_eq!(result.content["log_queries"], false);

    let result = engine.invoke("snapshot_memory", None);
    assert!(result.is_error);
    assert_eq!(result.content["error"]["kind"], "validation_error");
}

#[test]
fn test_graph_tools() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let api = ok(
        &engine,
        "add_knowledge_node",
        json!({"label": "API Gateway", "description": "edge proxy", "attributes": {"owner": "platform"}}),
    );
    assert_eq!(api["created"], true);
    let api_id = api["id"].as_u64().unwrap();
    ok(&engine, "add_knowledge_node", json!({"label": "Auth Service"}));

    let edge = ok(
        &engine,
        "add_knowledge_edge",
        json!({"from": api_id, "to": "auth service", "relation": "routes_to"}),
    );
    assert_eq!(edge["weight"], 1.0);
    assert_eq!(edge["from_id"], api_id);

    let traversal = ok(
        &engine,
        "traverse_knowledge_graph",
        json!({"start": "API Gateway", "max_hops": 2}),
    );
    assert_eq!(traversal["count"], 1);
    assert_eq!(traversal["paths"][0]["end_label"], "Auth Service");

    let listing = ok(&engine, "list_knowledge_nodes", json!({"include_edges": true}));
    assert_eq!(listing["count"], 2);
    assert_eq!(listing["edges"].as_array().unwrap().len(), 1);
    assert_eq!(listing["nodes"][0]["attributes"]["description"], "edge proxy");

    assert_eq!(
        error_kind(
            &engine,
            "add_knowledge_edge",
            json!({"from": "API Gateway", "to": "Nowhere", "relation": "r"})
        ),
        "not_found_error"
    );
    assert_eq!(
        error_kind(
            &engine,
            "traverse_knowledge_graph",
            json!({"start": "API Gateway", "max_hops": 0})
        ),
        "validation_error"
    );
}

#[test]
fn test_consolidate_tool() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    ok(&engine, "log_interaction", json!({"content": "Kestrel crashed on startup"}));

    assert_eq!(
        error_kind(&engine, "consolidate_memory", json!({"t_high": 0.7})),
        "validation_error"
    );
    assert_eq!(
        error_kind(&engine, "consolidate_memory", json!({})),
        "validation_error"
    );

    let report = ok(
        &engine,
        "consolidate_memory",
        json!({"t_high": 0.7, "t_low": 0.3, "retention_age_secs": 0, "prune_age_secs": 3600}),
    );
    assert_eq!(report["promoted"], 1);
    assert!(report.get("failed").is_none());

    let nodes = ok(&engine, "list_knowledge_nodes", json!({}));
    assert!(nodes["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["label"] == "Kestrel"));
}

#[test]
fn test_compress_tool() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let text = "The build failed on the release branch. The cause was a missing feature flag. \
                We added the flag to the workspace manifest. The release build passed after that. \
                Nobody touched the docs today.";
    let result = ok(
        &engine,
        "compress_prompt",
        json!({"text": text, "target_ratio": 0.5, "instruction": "release build"}),
    );
    let compressed = result["compressed_text"].as_str().unwrap();
    assert!(!compressed.is_empty());
    assert!(compressed.len() < text.len());
    assert!(result["ratio_achieved"].as_f64().unwrap() <= 1.0);

    assert_eq!(
        error_kind(&engine, "compress_prompt", json!({"text": text, "target_ratio": 0.0})),
        "validation_error"
    );
}

#[test]
fn test_conversation_tools() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let first = ok(&engine, "log_interaction", json!({"content": "first session note"}));
    let started = ok(&engine, "start_new_conversation", json!({}));
    assert_ne!(started["conversation_id"], first["conversation_id"]);

    let second = ok(&engine, "log_interaction", json!({"content": "second session note"}));
    assert_eq!(second["conversation_id"], started["conversation_id"]);
}

// ==================== Snapshots ====================

#[test]
fn test_snapshot_bundle_contains_state() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    ok(&engine, "log_interaction", json!({"content": "state worth keeping"}));
    ok(&engine, "add_knowledge_node", json!({"label": "Checkpointed"}));

    let snapshot = ok(&engine, "snapshot_memory", json!({"message": "before refactor"}));
    let reference = snapshot["ref"].as_str().unwrap();
    assert!(snapshot["summary"].as_str().unwrap().contains("before refactor"));

    let layout = StoreLayout::new(dir.path());
    let files = read_bundle(&ArchiveSnapshotter::bundle_path(&layout, reference)).unwrap();
    let names: Vec<&str> = files.iter().map(|(name, _)| name.as_str()).collect();
    assert!(names.contains(&"registry.json"));
    assert!(names.contains(&"graph.json"));
    assert!(names.iter().any(|n| n.starts_with("episodes/")));

    let graph = files
        .iter()
        .find(|(name, _)| name == "graph.json")
        .map(|(_, data)| String::from_utf8_lossy(data).to_string())
        .unwrap();
    assert!(graph.contains("Checkpointed"));

    engine.snapshot("second").unwrap();
    let all = engine.list_snapshots().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].reference, reference);
    assert_ne!(all[0].reference, all[1].reference);
}

// ==================== Activity & Auto-Ingest ====================

#[test]
fn test_recent_activity_groups_by_project() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    ok(&engine, "log_interaction", json!({"content": "alpha work item"}));
    let beta = engine.resolve_conversation(Some("/projects/beta")).unwrap();
    ok(
        &engine,
        "ingest_interaction",
        json!({"conversation_id": beta.conversation_id, "content": "beta work item"}),
    );

    let report = ok(&engine, "get_recent_activity", json!({"window_hours": 1.0}));
    let projects = report["projects"].as_array().unwrap();
    assert_eq!(projects.len(), 2);
    let keys: BTreeSet<&str> = projects
        .iter()
        .map(|p| p["project_key"].as_str().unwrap())
        .collect();
    assert!(keys.iter().any(|k| k.ends_with("alpha")));
    assert!(keys.iter().any(|k| k.ends_with("beta")));

    assert_eq!(
        error_kind(&engine, "get_recent_activity", json!({"window_hours": -1.0})),
        "validation_error"
    );
}

#[test]
fn test_auto_ingest_tools() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let status = ok(&engine, "get_auto_ingest_status", json!({}));
    assert_eq!(status["log_queries"], false);
    assert_eq!(status["log_responses"], false);

    let configured = ok(
        &engine,
        "configure_auto_ingest",
        json!({"enabled": true, "log_responses": false}),
    );
    assert_eq!(configured["log_queries"], true);
    assert_eq!(configured["log_responses"], false);

    // Other projects follow the global switch only.
    let other = ok(
        &engine,
        "get_auto_ingest_status",
        json!({"project_key": "/projects/beta"}),
    );
    assert_eq!(other["log_queries"], true);
    assert_eq!(other["log_responses"], true);

    // Settings live on disk and survive a restart.
    drop(engine);
    let engine = open(&dir);
    let status = ok(&engine, "get_auto_ingest_status", json!({}));
    assert_eq!(status["log_responses"], false);
}

// ==================== Stdio Transport ====================

#[test]
fn test_stdio_against_engine() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let input = [
        json!({"id": 1, "tool": "list_tools"}),
        json!({"id": 2, "tool": "log_interaction", "arguments": {"content": "over the wire"}}),
        json!({"id": 3, "tool": "retrieve_memory", "arguments": {"query": "wire"}}),
        json!({"id": 4, "tool": "add_knowledge_edge", "arguments": {"from": 1, "to": 2, "relation": "r"}}),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n");

    let mut out = Vec::new();
    StdioTransport::new(&engine)
        .serve(input.as_bytes(), &mut out)
        .unwrap();
    let responses: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(responses.len(), 4);
    assert!(responses[0]["result"]["tools"].as_array().unwrap().len() >= 13);
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[1]["result"]["surprise_score"], 1.0);
    assert_eq!(responses[2]["result"]["items"][0]["content"], "over the wire");
    assert_eq!(responses[3]["error"]["kind"], "not_found_error");
}

// ==================== CLI ====================

fn memx(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_memx"))
        .arg("--root")
        .arg(root)
        .args(["--project", "/projects/alpha"])
        .args(args)
        .output()
        .expect("failed to run memx")
}

#[test]
fn test_cli_log_and_retrieve() {
    let dir = TempDir::new().unwrap();

    let out = memx(dir.path(), &["--format", "json", "log", "cli wrote this line"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let logged: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(logged["surprise_score"], 1.0);

    let out = memx(dir.path(), &["--format", "json", "retrieve", "cli line"]);
    assert!(out.status.success());
    let retrieved: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(retrieved["items"][0]["content"], "cli wrote this line");
}

#[test]
fn test_cli_exit_codes() {
    let dir = TempDir::new().unwrap();

    let out = memx(dir.path(), &["log", "   "]);
    assert_eq!(out.status.code(), Some(3));

    let out = memx(dir.path(), &["traverse", "Nothing"]);
    assert_eq!(out.status.code(), Some(4));

    let out = memx(dir.path(), &["consolidate"]);
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn test_cli_tools_listing() {
    let dir = TempDir::new().unwrap();
    let out = memx(dir.path(), &["--format", "json", "tools"]);
    assert!(out.status.success());
    let tools: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(
        tools.as_array().unwrap().len(),
        ToolRegistry::list_tools().len()
    );
}
