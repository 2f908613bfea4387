//! CLI command implementations.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::activity::ProjectActivity;
use crate::config::ConsolidationPolicy;
use crate::engine::MemoryEngine;
use crate::ingest::{split_markdown_segments, AutoIngestStatus};
use crate::tools::ToolRegistry;
use crate::types::{format_micros, MemxError, MemxResult, NodeRef, Role};

fn emit<T: Serialize>(value: &T) -> MemxResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read `text`, or stdin when it is `-`.
pub fn read_text_arg(text: &str) -> MemxResult<String> {
    if text != "-" {
        return Ok(text.to_string());
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// A node argument: all digits means an id, anything else a label.
pub fn parse_node_ref(raw: &str) -> NodeRef {
    match raw.trim().parse::<u64>() {
        Ok(id) => NodeRef::Id(id),
        Err(_) => NodeRef::Label(raw.to_string()),
    }
}

pub fn parse_role(raw: &str) -> MemxResult<Role> {
    Role::from_name(raw).ok_or_else(|| MemxError::Validation(format!("Invalid role: {raw}")))
}

/// Score and append one interaction.
pub fn cmd_ingest(
    engine: &MemoryEngine,
    conversation_id: Option<&str>,
    role: Role,
    content: &str,
    json: bool,
) -> MemxResult<()> {
    let result = engine.ingest(conversation_id, role, content)?;
    if json {
        emit(&result)
    } else {
        println!(
            "Ingested interaction {} into {} (surprise {:.3})",
            result.id, result.conversation_id, result.surprise_score
        );
        Ok(())
    }
}

/// Append to the current project's conversation.
pub fn cmd_log(engine: &MemoryEngine, content: &str, role: Role, json: bool) -> MemxResult<()> {
    let result = engine.log_interaction(content, Some(role))?;
    if json {
        emit(&result)
    } else {
        println!(
            "Logged interaction {} in {} (surprise {:.3})",
            result.id, result.conversation_id, result.surprise_score
        );
        Ok(())
    }
}

pub fn cmd_retrieve(
    engine: &MemoryEngine,
    query: &str,
    conversation_id: Option<&str>,
    top_k: Option<usize>,
    json: bool,
) -> MemxResult<()> {
    let result = engine.retrieve(query, conversation_id, top_k)?;
    if json {
        return emit(&result);
    }
    if result.items.is_empty() {
        println!("No memories found for \"{}\"", result.query);
        return Ok(());
    }
    println!("{} result(s) for \"{}\":", result.items.len(), result.query);
    for (rank, item) in result.items.iter().enumerate() {
        println!("  {:>2}. [{:.3}] [{}] {}", rank + 1, item.score, item.source, item.content);
    }
    Ok(())
}

pub fn cmd_consolidate(
    engine: &MemoryEngine,
    conversation_id: Option<&str>,
    policy: Option<ConsolidationPolicy>,
    json: bool,
) -> MemxResult<()> {
    let report = engine.consolidate(conversation_id, policy)?;
    if json {
        return emit(&report);
    }
    println!(
        "Consolidated {}: {} promoted, {} summarized, {} pruned",
        conversation_id.unwrap_or("all conversations"),
        report.promoted,
        report.summarized,
        report.pruned
    );
    for failed in &report.failed {
        println!("  failed: {failed}");
    }
    Ok(())
}

/// Assert a knowledge node. `attributes` is a JSON object, if given.
pub fn cmd_node(
    engine: &MemoryEngine,
    label: &str,
    description: Option<&str>,
    attributes: Option<&str>,
    json: bool,
) -> MemxResult<()> {
    let mut attrs: BTreeMap<String, Value> = match attributes {
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            MemxError::Validation(format!("attributes must be a JSON object: {e}"))
        })?,
        None => BTreeMap::new(),
    };
    if let Some(description) = description {
        attrs.insert("description".to_string(), Value::String(description.to_string()));
    }
    let result = engine.add_knowledge_node(label, attrs)?;
    if json {
        emit(&result)
    } else {
        let verb = if result.created { "Added" } else { "Updated" };
        println!("{verb} node {} '{}'", result.id, result.label);
        Ok(())
    }
}

pub fn cmd_edge(
    engine: &MemoryEngine,
    from: &str,
    to: &str,
    relation: &str,
    weight: f32,
    json: bool,
) -> MemxResult<()> {
    let result = engine.add_knowledge_edge(&parse_node_ref(from), &parse_node_ref(to), relation, weight)?;
    if json {
        emit(&result)
    } else {
        println!(
            "Edge {}: {} --{}--> {} (weight {:.2})",
            result.id, result.from_id, result.relation, result.to_id, result.weight
        );
        Ok(())
    }
}

pub fn cmd_traverse(
    engine: &MemoryEngine,
    start: &str,
    max_hops: Option<u32>,
    min_weight: Option<f32>,
    json: bool,
) -> MemxResult<()> {
    let paths = engine.traverse(&parse_node_ref(start), max_hops, min_weight)?;
    if json {
        return emit(&paths);
    }
    println!("Reached {} node(s) from {start}:", paths.len());
    for path in &paths {
        let chain = path
            .steps
            .iter()
            .map(|s| format!("--{}-->", s.relation))
            .zip(path.steps.iter().map(|s| s.to_label.as_str()))
            .map(|(rel, to)| format!(" {rel} {to}"))
            .collect::<String>();
        let first = path.steps.first().map_or("", |s| s.from_label.as_str());
        println!("  [{} hop(s)] {first}{chain}", path.hops);
    }
    Ok(())
}

pub fn cmd_compress(
    engine: &MemoryEngine,
    text: &str,
    ratio: f32,
    instruction: Option<&str>,
    json: bool,
) -> MemxResult<()> {
    let text = read_text_arg(text)?;
    let compression = engine.compress_prompt(&text, ratio, instruction)?;
    if json {
        emit(&compression)
    } else {
        println!("{}", compression.compressed_text);
        eprintln!("(ratio achieved: {:.3})", compression.ratio_achieved);
        Ok(())
    }
}

pub fn cmd_snapshot(engine: &MemoryEngine, message: &str, json: bool) -> MemxResult<()> {
    let snapshot = engine.snapshot(message)?;
    if json {
        emit(&snapshot)
    } else {
        println!("Snapshot {}: {}", snapshot.reference, snapshot.summary);
        Ok(())
    }
}

pub fn cmd_snapshots(engine: &MemoryEngine, json: bool) -> MemxResult<()> {
    let snapshots = engine.list_snapshots()?;
    if json {
        return emit(&snapshots);
    }
    if snapshots.is_empty() {
        println!("No snapshots");
    }
    for snapshot in &snapshots {
        println!(
            "{}  {}  {}",
            snapshot.reference,
            format_micros(snapshot.timestamp),
            snapshot.summary
        );
    }
    Ok(())
}

pub fn cmd_activity(engine: &MemoryEngine, window_hours: f64, json: bool) -> MemxResult<()> {
    let report = engine.recent_activity(window_hours)?;
    if json {
        return emit(&report);
    }
    println!("Activity in the last {window_hours} hour(s):");
    for project in report.projects.iter().chain(report.external.iter()) {
        print_project(project);
    }
    Ok(())
}

fn print_project(project: &ProjectActivity) {
    let header = if project.source == crate::activity::ENGINE_SOURCE {
        project.project_key.clone()
    } else {
        format!("{} ({})", project.project_key, project.source)
    };
    if project.total == 0 {
        println!("  {header}: no activity");
        return;
    }
    println!("  {header}: {} interaction(s)", project.total);
    for item in &project.items {
        println!("    {} [{}] {}", item.time, item.role, item.snippet);
    }
    if project.omitted > 0 {
        println!("    ... {} more", project.omitted);
    }
}

fn print_auto_ingest(status: &AutoIngestStatus) {
    println!("Auto-ingest for {}:", status.project_key);
    println!("  Log queries: {}", status.log_queries);
    println!("  Log responses: {}", status.log_responses);
    match status.global_enabled {
        Some(enabled) => println!("  Global switch: {enabled}"),
        None => println!("  Global switch: unset (disabled)"),
    }
    if let Some(o) = &status.project_override {
        println!(
            "  Project override: queries={:?} responses={:?}",
            o.log_queries, o.log_responses
        );
    }
}

pub fn cmd_auto_ingest_status(
    engine: &MemoryEngine,
    project_key: Option<&str>,
    json: bool,
) -> MemxResult<()> {
    let status = engine.auto_ingest_status(project_key)?;
    if json {
        emit(&status)
    } else {
        print_auto_ingest(&status);
        Ok(())
    }
}

pub fn cmd_auto_ingest_configure(
    engine: &MemoryEngine,
    project_key: Option<&str>,
    enabled: Option<bool>,
    log_queries: Option<bool>,
    log_responses: Option<bool>,
    json: bool,
) -> MemxResult<()> {
    let status = engine.configure_auto_ingest(project_key, enabled, log_queries, log_responses)?;
    if json {
        emit(&status)
    } else {
        print_auto_ingest(&status);
        Ok(())
    }
}

pub fn cmd_new_conversation(
    engine: &MemoryEngine,
    project_key: Option<&str>,
    json: bool,
) -> MemxResult<()> {
    let resolved = engine.start_new_conversation(project_key)?;
    if json {
        emit(&resolved)
    } else {
        println!(
            "Started conversation {} for {}",
            resolved.conversation_id, resolved.project_key
        );
        Ok(())
    }
}

pub fn cmd_tools(json: bool) -> MemxResult<()> {
    let tools = ToolRegistry::list_tools();
    if json {
        return emit(&tools);
    }
    for tool in &tools {
        println!("{:<26} {}", tool.name, tool.description);
    }
    Ok(())
}

/// Import a Markdown notes file, one interaction per segment.
pub fn cmd_migrate(
    engine: &MemoryEngine,
    path: &Path,
    conversation_id: Option<&str>,
    role: Role,
    json: bool,
) -> MemxResult<()> {
    let text = std::fs::read_to_string(path)?;
    let segments = split_markdown_segments(&text);
    let mut results = Vec::with_capacity(segments.len());
    for segment in &segments {
        let result = engine.ingest(conversation_id, role, segment)?;
        if !json {
            println!(
                "Ingested segment {} as {} (surprise {:.3})",
                results.len() + 1,
                result.id,
                result.surprise_score
            );
        }
        results.push(result);
    }
    if json {
        emit(&results)
    } else {
        println!("Migrated {} segment(s) from {}", results.len(), path.display());
        Ok(())
    }
}

pub fn cmd_history(
    engine: &MemoryEngine,
    conversation_id: Option<&str>,
    limit: usize,
    json: bool,
) -> MemxResult<()> {
    let interactions = engine.recent(conversation_id, limit)?;
    let digest = engine.digest(conversation_id)?;
    if json {
        return emit(&serde_json::json!({
            "interactions": interactions,
            "digest": digest,
        }));
    }
    if !digest.is_empty() {
        println!("Digest:\n{digest}\n");
    }
    for i in &interactions {
        println!(
            "{:>6} {} [{}] ({}, {:.3}) {}",
            i.id,
            format_micros(i.timestamp),
            i.role,
            i.status,
            i.surprise_score,
            i.content
        );
    }
    Ok(())
}

pub fn cmd_nodes(engine: &MemoryEngine, with_edges: bool, json: bool) -> MemxResult<()> {
    let nodes = engine.nodes();
    let edges = if with_edges { engine.edges() } else { Vec::new() };
    if json {
        return emit(&serde_json::json!({ "nodes": nodes, "edges": edges }));
    }
    println!("{} node(s)", nodes.len());
    for node in &nodes {
        println!(
            "  {:>5} {} ({} source(s))",
            node.id,
            node.label,
            node.source_interaction_ids.len()
        );
    }
    for edge in &edges {
        println!(
            "  edge {}: {} --{}--> {} ({:.2})",
            edge.id, edge.from_id, edge.relation, edge.to_id, edge.weight
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_refs_from_cli_args() {
        assert_eq!(parse_node_ref("42"), NodeRef::Id(42));
        assert_eq!(parse_node_ref("Atlas"), NodeRef::Label("Atlas".to_string()));
    }
}
