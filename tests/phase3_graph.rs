//! Phase 3 tests: knowledge graph upserts, provenance and traversal.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tempfile::TempDir;

use memx::graph::bfs_paths;
use memx::{
    EngineConfig, InteractionStatus, KnowledgeGraph, MemoryEngine, MemxError, NodeRef,
    TraversalParams,
};

fn open(dir: &TempDir) -> MemoryEngine {
    let config = EngineConfig::for_root(dir.path()).with_project_key("/projects/alpha");
    MemoryEngine::open(config).unwrap()
}

fn label(s: &str) -> NodeRef {
    NodeRef::Label(s.to_string())
}

fn sources(ids: &[u64]) -> BTreeSet<u64> {
    ids.iter().copied().collect()
}

// ==================== Nodes ====================

#[test]
fn test_node_upsert_merges_by_label() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let first = engine
        .add_knowledge_node(
            "Rust Compiler",
            BTreeMap::from([("version".to_string(), json!("1.80"))]),
        )
        .unwrap();
    let second = engine
        .add_knowledge_node(
            "  rust   compiler ",
            BTreeMap::from([("edition".to_string(), json!("2021"))]),
        )
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.id, second.id);
    assert_eq!(engine.nodes().len(), 1);

    let node = engine.node(&NodeRef::Id(first.id)).unwrap();
    assert_eq!(node.label, "Rust Compiler");
    assert_eq!(node.attributes["version"], json!("1.80"));
    assert_eq!(node.attributes["edition"], json!("2021"));
    assert_eq!(
        node.source_interaction_ids,
        sources(&[first.provenance_id, second.provenance_id])
    );
}

#[test]
fn test_node_provenance_is_promoted_interaction() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let node = engine.add_knowledge_node("Tokio", BTreeMap::new()).unwrap();
    let provenance = engine.interaction(node.provenance_id).unwrap();
    assert_eq!(provenance.status, InteractionStatus::Promoted);
    assert!(provenance.content.contains("Tokio"));
}

#[test]
fn test_node_label_validation() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let err = engine.add_knowledge_node("   ", BTreeMap::new()).unwrap_err();
    assert!(matches!(err, MemxError::Validation(_)));
    assert!(engine.nodes().is_empty());
}

#[test]
fn test_graph_rejects_missing_provenance() {
    let mut graph = KnowledgeGraph::new();
    let err = graph
        .upsert_node("Orphan", BTreeMap::new(), &BTreeSet::new(), 0)
        .unwrap_err();
    assert!(matches!(err, MemxError::Validation(_)));
}

// ==================== Edges ====================

#[test]
fn test_edge_by_id_and_label() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let a = engine.add_knowledge_node("Parser", BTreeMap::new()).unwrap();
    engine.add_knowledge_node("Lexer", BTreeMap::new()).unwrap();

    let edge = engine
        .add_knowledge_edge(&NodeRef::Id(a.id), &label("lexer"), "depends_on", 0.8)
        .unwrap();
    assert!(edge.created);
    assert_eq!(edge.from_id, a.id);
    assert!((edge.weight - 0.8).abs() < 1e-6);
    assert_eq!(
        engine.interaction(edge.provenance_id).unwrap().status,
        InteractionStatus::Promoted
    );
}

#[test]
fn test_edge_merge_keeps_max_weight() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    engine.add_knowledge_node("Cache", BTreeMap::new()).unwrap();
    engine.add_knowledge_node("Database", BTreeMap::new()).unwrap();

    let first = engine
        .add_knowledge_edge(&label("Cache"), &label("Database"), "fronts", 0.9)
        .unwrap();
    let second = engine
        .add_knowledge_edge(&label("Cache"), &label("Database"), "FRONTS", 0.4)
        .unwrap();

    assert_eq!(first.id, second.id);
    assert!(!second.created);
    assert!((second.weight - 0.9).abs() < 1e-6);

    let edges = engine.edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(
        edges[0].source_interaction_ids,
        sources(&[first.provenance_id, second.provenance_id])
    );
}

#[test]
fn test_edge_to_unknown_node() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    engine.add_knowledge_node("Known", BTreeMap::new()).unwrap();
    let before = engine.recent(None, 100).unwrap().len();

    let err = engine
        .add_knowledge_edge(&label("Known"), &label("Unknown"), "links", 0.5)
        .unwrap_err();
    assert!(matches!(err, MemxError::NotFound { .. }));
    let err = engine
        .add_knowledge_edge(&label("Known"), &NodeRef::Id(999), "links", 0.5)
        .unwrap_err();
    assert!(matches!(err, MemxError::NotFound { .. }));

    // Failed edges leave no provenance behind.
    assert_eq!(engine.recent(None, 100).unwrap().len(), before);
    assert!(engine.edges().is_empty());
}

#[test]
fn test_edge_weight_bounds() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    engine.add_knowledge_node("A", BTreeMap::new()).unwrap();
    engine.add_knowledge_node("B", BTreeMap::new()).unwrap();
    for weight in [-0.1, 1.5, f32::NAN] {
        let err = engine
            .add_knowledge_edge(&label("A"), &label("B"), "r", weight)
            .unwrap_err();
        assert!(matches!(err, MemxError::Validation(_)), "weight {weight}");
    }
    let err = engine
        .add_knowledge_edge(&label("A"), &label("B"), "  ", 0.5)
        .unwrap_err();
    assert!(matches!(err, MemxError::Validation(_)));
}

// ==================== Traversal ====================

#[test]
fn test_traversal_terminates_on_cycle() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    for name in ["A", "B", "C"] {
        engine.add_knowledge_node(name, BTreeMap::new()).unwrap();
    }
    engine
        .add_knowledge_edge(&label("A"), &label("B"), "next", 1.0)
        .unwrap();
    engine
        .add_knowledge_edge(&label("B"), &label("C"), "next", 1.0)
        .unwrap();
    engine
        .add_knowledge_edge(&label("C"), &label("A"), "next", 1.0)
        .unwrap();

    let paths = engine.traverse(&label("A"), Some(5), None).unwrap();
    assert_eq!(paths.len(), 2);
    let ends: Vec<&str> = paths.iter().map(|p| p.end_label.as_str()).collect();
    assert_eq!(ends, vec!["B", "C"]);
    assert_eq!(paths[0].hops, 1);
    assert_eq!(paths[1].hops, 2);
    assert_eq!(paths[1].steps.len(), 2);
}

#[test]
fn test_traversal_self_loop() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    engine.add_knowledge_node("Loop", BTreeMap::new()).unwrap();
    engine
        .add_knowledge_edge(&label("Loop"), &label("Loop"), "self", 1.0)
        .unwrap();
    let paths = engine.traverse(&label("Loop"), Some(3), None).unwrap();
    assert!(paths.is_empty());
}

#[test]
fn test_traversal_respects_hops_and_weight() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    for name in ["Root", "Strong", "Weak", "Far"] {
        engine.add_knowledge_node(name, BTreeMap::new()).unwrap();
    }
    engine
        .add_knowledge_edge(&label("Root"), &label("Strong"), "r", 0.9)
        .unwrap();
    engine
        .add_knowledge_edge(&label("Root"), &label("Weak"), "r", 0.2)
        .unwrap();
    engine
        .add_knowledge_edge(&label("Strong"), &label("Far"), "r", 0.9)
        .unwrap();

    let one_hop = engine.traverse(&label("Root"), Some(1), None).unwrap();
    assert_eq!(one_hop.len(), 2);
    // Heavier edges first.
    assert_eq!(one_hop[0].end_label, "Strong");

    let filtered = engine.traverse(&label("Root"), Some(3), Some(0.5)).unwrap();
    let ends: HashSet<&str> = filtered.iter().map(|p| p.end_label.as_str()).collect();
    assert_eq!(ends, HashSet::from(["Strong", "Far"]));

    let far = filtered.iter().find(|p| p.end_label == "Far").unwrap();
    assert_eq!(far.evidence.len(), 2);
}

#[test]
fn test_traversal_keeps_path_through_first_parent() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    for name in ["Root", "Heavy", "Light", "Target"] {
        engine.add_knowledge_node(name, BTreeMap::new()).unwrap();
    }
    engine
        .add_knowledge_edge(&label("Root"), &label("Heavy"), "r", 0.9)
        .unwrap();
    engine
        .add_knowledge_edge(&label("Root"), &label("Light"), "r", 0.5)
        .unwrap();
    engine
        .add_knowledge_edge(&label("Heavy"), &label("Target"), "r", 0.1)
        .unwrap();
    engine
        .add_knowledge_edge(&label("Light"), &label("Target"), "r", 1.0)
        .unwrap();

    // Heavy is expanded first, so Target is reached through it even though
    // Light has the heavier final edge.
    let paths = engine.traverse(&label("Root"), Some(2), None).unwrap();
    let target = paths.iter().find(|p| p.end_label == "Target").unwrap();
    assert_eq!(target.hops, 2);
    assert_eq!(target.steps[0].to_label, "Heavy");
    assert!((target.steps[1].weight - 0.1).abs() < 1e-6);
}

#[test]
fn test_traversal_rejects_bad_parameters() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    engine.add_knowledge_node("Start", BTreeMap::new()).unwrap();
    assert!(matches!(
        engine.traverse(&label("Start"), Some(0), None).unwrap_err(),
        MemxError::Validation(_)
    ));
    assert!(matches!(
        engine.traverse(&label("Start"), Some(3), Some(2.0)).unwrap_err(),
        MemxError::Validation(_)
    ));
    assert!(matches!(
        engine.traverse(&label("Missing"), None, None).unwrap_err(),
        MemxError::NotFound { .. }
    ));
}

#[test]
fn test_traversal_random_graphs_terminate() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let mut graph = KnowledgeGraph::new();
        let provenance = sources(&[1]);
        let count = rng.gen_range(2..40);
        let ids: Vec<u64> = (0..count)
            .map(|i| {
                graph
                    .upsert_node(&format!("n{i}"), BTreeMap::new(), &provenance, 0)
                    .unwrap()
                    .0
            })
            .collect();
        for _ in 0..count * 3 {
            let from = ids[rng.gen_range(0..ids.len())];
            let to = ids[rng.gen_range(0..ids.len())];
            let weight: f32 = rng.gen_range(0.0..=1.0);
            graph
                .upsert_edge(from, to, "r", weight, &provenance, 0)
                .unwrap();
        }

        let paths = bfs_paths(&graph, ids[0], TraversalParams::new(16)).unwrap();
        assert!(paths.len() < ids.len());
        let ends: HashSet<u64> = paths.iter().map(|p| p.end_id).collect();
        assert_eq!(ends.len(), paths.len());
        assert!(!ends.contains(&ids[0]));
        for path in &paths {
            assert_eq!(path.steps.len() as u32, path.hops);
            assert_eq!(path.steps[0].from_id, ids[0]);
            assert_eq!(path.steps.last().unwrap().to_id, path.end_id);
        }
    }
}

// ==================== Persistence ====================

#[test]
fn test_graph_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open(&dir);
        engine.add_knowledge_node("Server", BTreeMap::new()).unwrap();
        engine.add_knowledge_node("Client", BTreeMap::new()).unwrap();
        engine
            .add_knowledge_edge(&label("Client"), &label("Server"), "calls", 0.7)
            .unwrap();
    }
    let engine = open(&dir);
    assert_eq!(engine.nodes().len(), 2);
    let paths = engine.traverse(&label("Client"), Some(1), None).unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].end_label, "Server");

    // Ids continue past the persisted ones.
    let third = engine.add_knowledge_node("Proxy", BTreeMap::new()).unwrap();
    assert!(engine.nodes().iter().filter(|n| n.id == third.id).count() == 1);
    assert_eq!(engine.nodes().len(), 3);
}
