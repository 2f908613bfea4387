//! Phase 1 tests: session registry, episodic log and persistence.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use memx::store::StoreLayout;
use memx::{
    EngineConfig, InteractionStatus, MemoryEngine, MemxError, NewInteraction, Role, SessionStatus,
};

const ALPHA: &str = "/projects/alpha";
const BETA: &str = "/projects/beta";

fn open(dir: &TempDir) -> MemoryEngine {
    let config = EngineConfig::for_root(dir.path()).with_project_key(ALPHA);
    MemoryEngine::open(config).unwrap()
}

// ==================== Session Registry ====================

#[test]
fn test_resolve_is_stable() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let first = engine.resolve_conversation(None).unwrap();
    assert!(first.created);
    for _ in 0..10 {
        let again = engine.resolve_conversation(None).unwrap();
        assert_eq!(again.conversation_id, first.conversation_id);
        assert!(!again.created);
    }
}

#[test]
fn test_projects_are_isolated() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let alpha = engine.resolve_conversation(Some(ALPHA)).unwrap();
    let beta = engine.resolve_conversation(Some(BETA)).unwrap();
    assert_ne!(alpha.conversation_id, beta.conversation_id);

    // A subdirectory is its own project, never folded into its parent.
    let nested = engine
        .resolve_conversation(Some("/projects/alpha/sub"))
        .unwrap();
    assert_ne!(nested.conversation_id, alpha.conversation_id);
}

#[test]
fn test_project_key_normalization() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let plain = engine.resolve_conversation(Some(ALPHA)).unwrap();
    let messy = engine
        .resolve_conversation(Some("/projects/./beta/../alpha"))
        .unwrap();
    assert_eq!(plain.conversation_id, messy.conversation_id);

    let err = engine.resolve_conversation(Some("   ")).unwrap_err();
    assert!(matches!(err, MemxError::Validation(_)));
}

#[test]
fn test_start_new_conversation_archives_old() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let old = engine.resolve_conversation(None).unwrap();
    engine.log_interaction("before the switch", None).unwrap();

    let new = engine.start_new_conversation(None).unwrap();
    assert_ne!(new.conversation_id, old.conversation_id);

    let archived = engine.session(&old.conversation_id).unwrap();
    assert_eq!(archived.status, SessionStatus::Archived);
    let active = engine.session(&new.conversation_id).unwrap();
    assert_eq!(active.status, SessionStatus::Active);

    let resolved = engine.resolve_conversation(None).unwrap();
    assert_eq!(resolved.conversation_id, new.conversation_id);

    // The archived conversation stays readable.
    let history = engine.recent(Some(&old.conversation_id), 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "before the switch");
}

#[test]
fn test_concurrent_resolve_creates_one_session() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(open(&dir));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || engine.resolve_conversation(Some(BETA)).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let ids: HashSet<_> = results.iter().map(|r| r.conversation_id.clone()).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(results.iter().filter(|r| r.created).count(), 1);
}

#[test]
fn test_registry_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let engine = open(&dir);
        engine.resolve_conversation(None).unwrap().conversation_id
    };
    let engine = open(&dir);
    assert_eq!(engine.resolve_conversation(None).unwrap().conversation_id, id);
    assert!(dir.path().join("registry.json").exists());
}

// ==================== Episodic Log ====================

#[test]
fn test_ingest_assigns_unique_ids_and_owner() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let a = engine.ingest(None, Role::User, "first message").unwrap();
    let b = engine.ingest(None, Role::Assistant, "second message").unwrap();
    let beta = engine.resolve_conversation(Some(BETA)).unwrap();
    let c = engine
        .ingest(Some(&beta.conversation_id), Role::User, "elsewhere")
        .unwrap();

    assert_ne!(a.id, b.id);
    assert_ne!(b.id, c.id);
    assert_eq!(a.conversation_id, b.conversation_id);
    assert_eq!(c.conversation_id, beta.conversation_id);
    assert!(c.project_key.ends_with("beta"));

    let stored = engine.interaction(b.id).unwrap();
    assert_eq!(stored.seq, 1);
    assert_eq!(stored.role, Role::Assistant);
    assert_eq!(stored.status, InteractionStatus::Raw);
}

#[test]
fn test_ingest_rejects_empty_content() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let err = engine.ingest(None, Role::User, "   ").unwrap_err();
    assert!(matches!(err, MemxError::Validation(_)));
    let err = engine.log_interaction("", None).unwrap_err();
    assert!(matches!(err, MemxError::Validation(_)));
}

#[test]
fn test_ingest_unknown_conversation() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let err = engine
        .ingest(Some("conv_does_not_exist"), Role::User, "hello")
        .unwrap_err();
    assert!(matches!(err, MemxError::NotFound { .. }));
}

#[test]
fn test_concurrent_appends_are_linearized() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(open(&dir));
    let conversation = engine.resolve_conversation(None).unwrap().conversation_id;

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = engine.clone();
            let conversation = conversation.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    let content = format!("worker {t} message {i} about topic{t}x{i}");
                    engine
                        .ingest(Some(&conversation), Role::User, &content)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let all = engine.recent(Some(&conversation), 100).unwrap();
    assert_eq!(all.len(), 40);
    for (pos, interaction) in all.iter().enumerate() {
        assert_eq!(interaction.seq, pos as u64);
    }
    let ids: HashSet<_> = all.iter().map(|i| i.id).collect();
    assert_eq!(ids.len(), 40);
}

// ==================== Status Transitions ====================

#[test]
fn test_terminal_status_is_final() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let id = engine.log_interaction("something to settle", None).unwrap().id;
    engine.mark(id, InteractionStatus::Summarized).unwrap();

    let err = engine.mark(id, InteractionStatus::Promoted).unwrap_err();
    assert!(matches!(
        err,
        MemxError::InvalidTransition {
            from: InteractionStatus::Summarized,
            to: InteractionStatus::Promoted,
            ..
        }
    ));
    let err = engine.mark(id, InteractionStatus::Raw).unwrap_err();
    assert!(matches!(err, MemxError::InvalidTransition { .. }));
}

#[test]
fn test_raw_to_raw_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let id = engine.log_interaction("still raw", None).unwrap().id;
    let err = engine.mark(id, InteractionStatus::Raw).unwrap_err();
    assert!(matches!(err, MemxError::InvalidTransition { .. }));
    assert!(matches!(
        engine.mark(9_999, InteractionStatus::Pruned).unwrap_err(),
        MemxError::NotFound { .. }
    ));
}

#[test]
fn test_pruned_content_leaves_disk() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let conversation = engine.resolve_conversation(None).unwrap().conversation_id;
    let id = engine
        .log_interaction("secret-token-xyz should vanish", None)
        .unwrap()
        .id;
    engine.mark(id, InteractionStatus::Pruned).unwrap();

    let pruned = engine.interaction(id).unwrap();
    assert_eq!(pruned.status, InteractionStatus::Pruned);
    assert!(pruned.content.is_empty());

    let layout = StoreLayout::new(dir.path());
    let raw = std::fs::read_to_string(layout.episode_log(&conversation).unwrap()).unwrap();
    assert!(!raw.contains("secret-token-xyz"));
}

// ==================== Persistence ====================

#[test]
fn test_interactions_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let (conversation, kept, summarized) = {
        let engine = open(&dir);
        let kept = engine.log_interaction("kept as raw", None).unwrap();
        let summarized = engine.log_interaction("later summarized", None).unwrap();
        engine
            .mark(summarized.id, InteractionStatus::Summarized)
            .unwrap();
        engine.shutdown().unwrap();
        (kept.conversation_id, kept.id, summarized.id)
    };

    let engine = open(&dir);
    let all = engine.recent(Some(&conversation), 10).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(engine.interaction(kept).unwrap().content, "kept as raw");
    assert_eq!(
        engine.interaction(summarized).unwrap().status,
        InteractionStatus::Summarized
    );

    // Ids keep growing after a restart.
    let next = engine.log_interaction("after restart", None).unwrap();
    assert!(next.id > summarized);
}

#[test]
fn test_record_keeps_given_score_and_timestamp() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let conversation = engine.resolve_conversation(None).unwrap().conversation_id;

    let recorded = engine
        .record(
            NewInteraction::new(&conversation, Role::Tool, "imported line")
                .surprise_score(0.42)
                .timestamp(1_700_000_000_000_000),
        )
        .unwrap();
    assert!((recorded.surprise_score - 0.42).abs() < 1e-6);
    assert_eq!(recorded.timestamp, 1_700_000_000_000_000);
    assert_eq!(recorded.role, Role::Tool);
}

#[test]
fn test_torn_tail_does_not_swallow_next_append() {
    let dir = TempDir::new().unwrap();
    let (conversation, first) = {
        let engine = open(&dir);
        let first = engine
            .log_interaction("first message about Rust", None)
            .unwrap();
        engine.shutdown().unwrap();
        (first.conversation_id, first.id)
    };

    // Crash in the middle of an append: a partial record without a newline.
    let path = StoreLayout::new(dir.path()).episode_log(&conversation).unwrap();
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    std::io::Write::write_all(&mut file, br#"{"op":"append","interac"#).unwrap();
    drop(file);

    let second = {
        let engine = open(&dir);
        assert_eq!(engine.recent(Some(&conversation), 10).unwrap().len(), 1);
        let second = engine
            .log_interaction("second message after crash", None)
            .unwrap();
        engine.shutdown().unwrap();
        second
    };
    assert_ne!(second.id, first);

    let engine = open(&dir);
    let contents: Vec<String> = engine
        .recent(Some(&conversation), 10)
        .unwrap()
        .into_iter()
        .map(|i| i.content)
        .collect();
    assert_eq!(
        contents,
        vec!["first message about Rust", "second message after crash"]
    );
    assert_eq!(
        engine.interaction(second.id).unwrap().content,
        "second message after crash"
    );

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(raw.last(), Some(&b'\n'));
}

// ==================== Root Ownership ====================

#[test]
fn test_second_engine_on_same_root_is_refused() {
    let dir = TempDir::new().unwrap();
    let alpha = open(&dir);
    let alpha_conversation = alpha.resolve_conversation(None).unwrap().conversation_id;
    let first = alpha.log_interaction("alpha owns this root", None).unwrap();

    let config = EngineConfig::for_root(dir.path()).with_project_key(BETA);
    let err = MemoryEngine::open(config.clone()).err().unwrap();
    assert!(matches!(err, MemxError::ConcurrencyConflict(_)));

    // The refused open left alpha's state alone.
    assert_eq!(
        alpha.resolve_conversation(None).unwrap().conversation_id,
        alpha_conversation
    );
    drop(alpha);

    let beta = MemoryEngine::open(config).unwrap();
    let second = beta.log_interaction("beta after alpha closed", None).unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(
        beta.resolve_conversation(Some(ALPHA)).unwrap().conversation_id,
        alpha_conversation
    );
    drop(beta);

    let alpha = open(&dir);
    assert_eq!(
        alpha.resolve_conversation(None).unwrap().conversation_id,
        alpha_conversation
    );
    assert_eq!(alpha.projects().len(), 2);
}
