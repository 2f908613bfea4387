//! Phase 2 tests: surprise scoring.

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;

use memx::engine::SurpriseScorer;
use memx::services::{HashingEmbedder, HeuristicExtractor};
use memx::{
    EngineConfig, FlatIndex, KnowledgeGraph, MemoryEngine, MemxError, NodeRef, Role, ScorerConfig,
};

fn open(dir: &TempDir) -> MemoryEngine {
    let config = EngineConfig::for_root(dir.path()).with_project_key("/projects/alpha");
    MemoryEngine::open(config).unwrap()
}

// ==================== Bounds ====================

#[test]
fn test_first_interaction_is_maximally_surprising() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let result = engine.ingest(None, Role::User, "hello").unwrap();
    assert_eq!(result.surprise_score, 1.0);
}

#[test]
fn test_immediate_duplicate_is_unsurprising() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let first = engine
        .ingest(None, Role::User, "the deploy script lives in ops folder")
        .unwrap();
    let second = engine
        .ingest(None, Role::User, "the deploy script lives in ops folder")
        .unwrap();
    assert_eq!(first.surprise_score, 1.0);
    assert!(
        second.surprise_score < 0.05,
        "duplicate scored {}",
        second.surprise_score
    );
}

#[test]
fn test_scores_stay_in_unit_interval() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let messages = [
        "compile the parser module",
        "compile the parser module again",
        "the lexer rejects unicode identifiers",
        "unicode identifiers in the lexer",
        "completely unrelated note about lunch",
    ];
    for message in messages {
        let score = engine.ingest(None, Role::User, message).unwrap().surprise_score;
        assert!((0.0..=1.0).contains(&score), "{message}: {score}");
    }
}

#[test]
fn test_scoring_is_deterministic() {
    let run = || {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        ["alpha release blocked on tests", "tests fixed", "alpha release blocked on tests"]
            .iter()
            .map(|m| engine.ingest(None, Role::User, m).unwrap().surprise_score)
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_score_does_not_write() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    engine.ingest(None, Role::User, "baseline message").unwrap();
    let breakdown = engine.score("baseline message", None).unwrap();
    assert!(breakdown.score < 0.05);
    assert_eq!(breakdown.neighbors, 1);
    assert_eq!(engine.recent(None, 10).unwrap().len(), 1);
}

#[test]
fn test_unscorable_content_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let err = engine.ingest(None, Role::User, "?!? ... ---").unwrap_err();
    assert!(matches!(err, MemxError::Validation(_)));
}

// ==================== Recency ====================

#[test]
fn test_old_duplicate_scores_higher_than_fresh_one() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let repeated = "kubernetes ingress timeout tuning";

    engine.ingest(None, Role::User, repeated).unwrap();
    let fresh = engine.score(repeated, None).unwrap();

    for i in 0..100 {
        let filler = format!("filler{i} zebra{i} quartz{i}");
        engine.ingest(None, Role::User, &filler).unwrap();
    }
    let aged = engine.score(repeated, None).unwrap();

    assert!(
        aged.score > fresh.score + 0.2,
        "aged {} vs fresh {}",
        aged.score,
        fresh.score
    );
    assert!(aged.max_similarity < fresh.max_similarity);
}

#[test]
fn test_conversations_do_not_share_neighbors() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    engine
        .ingest(None, Role::User, "shared sentence across projects")
        .unwrap();
    let beta = engine.resolve_conversation(Some("/projects/beta")).unwrap();
    let other = engine
        .ingest(
            Some(&beta.conversation_id),
            Role::User,
            "shared sentence across projects",
        )
        .unwrap();
    assert_eq!(other.surprise_score, 1.0);
}

// ==================== Familiarity ====================

#[test]
fn test_familiar_entities_lower_the_score() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    // Score in a second project so graph assertions in the first do not
    // become neighbors.
    let beta = engine
        .resolve_conversation(Some("/projects/beta"))
        .unwrap()
        .conversation_id;
    engine
        .ingest(Some(&beta), Role::User, "we discussed the caching layer yesterday")
        .unwrap();

    let candidate = "Postgres replication lag spiked during the caching rollout";
    let before = engine.score(candidate, Some(&beta)).unwrap();
    assert_eq!(before.familiarity, 0.0);

    engine
        .add_knowledge_node("Postgres", BTreeMap::new())
        .unwrap();
    for source in ["Billing", "Auth", "Search", "Reports"] {
        engine.add_knowledge_node(source, BTreeMap::new()).unwrap();
        engine
            .add_knowledge_edge(
                &NodeRef::Label(source.to_string()),
                &NodeRef::Label("Postgres".to_string()),
                "depends_on",
                1.0,
            )
            .unwrap();
    }

    let after = engine.score(candidate, Some(&beta)).unwrap();
    assert!(after.familiarity > 0.0);
    assert!(after.score < before.score);
}

#[test]
fn test_familiarity_saturates() {
    let embedder = Arc::new(HashingEmbedder::new(64));
    let index = Arc::new(FlatIndex::new());
    let extractor = Arc::new(HeuristicExtractor::new());
    let scorer = SurpriseScorer::new(ScorerConfig::default(), embedder, index, extractor);

    let mut graph = KnowledgeGraph::new();
    let sources = [1u64].into_iter().collect();
    let (hub, _) = graph.upsert_node("Redis", BTreeMap::new(), &sources, 0).unwrap();

    let mut last = scorer.familiarity(&graph, "Redis is down").unwrap();
    assert_eq!(last, 0.0);
    for i in 0..50 {
        let (leaf, _) = graph
            .upsert_node(&format!("Service{i}"), BTreeMap::new(), &sources, 0)
            .unwrap();
        graph
            .upsert_edge(leaf, hub, "uses", 1.0, &sources, 0)
            .unwrap();
        let next = scorer.familiarity(&graph, "Redis is down").unwrap();
        assert!(next > last);
        assert!(next < 1.0);
        last = next;
    }
    assert!(last > 0.9);

    // Unknown entities contribute nothing.
    assert_eq!(scorer.familiarity(&graph, "Kafka is down").unwrap(), 0.0);
}
