//! The sleep cycle: settle raw interactions into the graph, the digest, or the bin.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::config::ConsolidationPolicy;
use crate::graph::{GraphStore, KnowledgeGraph};
use crate::index::VectorIndex;
use crate::services::{Extraction, Extractor, TextCompressor};
use crate::store::episodic::{embedding_key, BatchRun};
use crate::store::{EpisodicStore, StatusChange};
use crate::sync::lock;
use crate::types::{
    now_micros, Interaction, InteractionId, InteractionStatus, MemxError, MemxResult,
    MICROS_PER_SEC,
};

/// Upper bound on a conversation digest, in characters.
pub const DIGEST_MAX_CHARS: usize = 4000;

/// What a consolidation run covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConsolidationScope {
    Conversation(String),
    All,
}

impl std::fmt::Display for ConsolidationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conversation(id) => write!(f, "{id}"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Counts of interactions settled by one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    pub promoted: usize,
    pub summarized: usize,
    pub pruned: usize,
    /// Conversations whose batch failed and was rolled back (global runs only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

impl ConsolidationReport {
    fn absorb(&mut self, other: ConsolidationReport) {
        self.promoted += other.promoted;
        self.summarized += other.summarized;
        self.pruned += other.pruned;
        self.failed.extend(other.failed);
    }

    /// Whether the run changed nothing.
    pub fn is_empty(&self) -> bool {
        self.promoted == 0 && self.summarized == 0 && self.pruned == 0
    }
}

/// Cooperative cancellation flag shared with a running consolidation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> MemxResult<()> {
        if self.is_cancelled() {
            Err(MemxError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct InFlight {
    global: bool,
    conversations: HashSet<String>,
}

/// At most one run per scope. A global run excludes every other run.
#[derive(Default)]
pub(crate) struct ScopeLocks {
    in_flight: Mutex<InFlight>,
}

impl ScopeLocks {
    pub(crate) fn acquire(&self, scope: &ConsolidationScope) -> MemxResult<ScopeGuard<'_>> {
        let mut state = lock(&self.in_flight);
        let busy = match scope {
            ConsolidationScope::All => state.global || !state.conversations.is_empty(),
            ConsolidationScope::Conversation(id) => {
                state.global || state.conversations.contains(id)
            }
        };
        if busy {
            return Err(MemxError::ConcurrencyConflict(format!(
                "consolidation already running for scope {scope}"
            )));
        }
        match scope {
            ConsolidationScope::All => state.global = true,
            ConsolidationScope::Conversation(id) => {
                state.conversations.insert(id.clone());
            }
        }
        Ok(ScopeGuard {
            locks: self,
            scope: scope.clone(),
        })
    }
}

pub(crate) struct ScopeGuard<'a> {
    locks: &'a ScopeLocks,
    scope: ConsolidationScope,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.locks.in_flight);
        match &self.scope {
            ConsolidationScope::All => state.global = false,
            ConsolidationScope::Conversation(id) => {
                state.conversations.remove(id);
            }
        }
    }
}

/// Decisions for one conversation, computed outside any store lock.
#[derive(Default)]
struct BatchPlan {
    promotions: Vec<(InteractionId, Extraction)>,
    summaries: Vec<Interaction>,
    prunes: Vec<InteractionId>,
    processed_up_to: u64,
}

impl BatchPlan {
    fn is_empty(&self) -> bool {
        self.promotions.is_empty() && self.summaries.is_empty() && self.prunes.is_empty()
    }

    fn changes(&self) -> Vec<StatusChange> {
        let promoted = self.promotions.iter().map(|(id, _)| StatusChange {
            id: *id,
            status: InteractionStatus::Promoted,
        });
        let summarized = self.summaries.iter().map(|i| StatusChange {
            id: i.id,
            status: InteractionStatus::Summarized,
        });
        let pruned = self.prunes.iter().map(|&id| StatusChange {
            id,
            status: InteractionStatus::Pruned,
        });
        promoted.chain(summarized).chain(pruned).collect()
    }
}

/// One consolidation run over borrowed engine state.
pub(crate) struct Consolidator<'a> {
    pub episodic: &'a EpisodicStore,
    pub graph: &'a GraphStore,
    pub index: &'a dyn VectorIndex,
    pub extractor: &'a dyn Extractor,
    pub compressor: &'a dyn TextCompressor,
    pub policy: ConsolidationPolicy,
    pub cancel: &'a CancelToken,
}

impl Consolidator<'_> {
    /// Run over `scope`. A single-conversation failure is returned as an
    /// error; in a global run it is logged, recorded in `failed`, and the
    /// remaining conversations still run. Cancellation always aborts.
    pub(crate) fn run(&self, scope: &ConsolidationScope) -> MemxResult<ConsolidationReport> {
        self.policy.validate()?;
        match scope {
            ConsolidationScope::Conversation(id) => self.conversation(id),
            ConsolidationScope::All => {
                let mut report = ConsolidationReport::default();
                for id in self.episodic.conversation_ids() {
                    match self.conversation(&id) {
                        Ok(r) => report.absorb(r),
                        Err(MemxError::Cancelled) => return Err(MemxError::Cancelled),
                        Err(e) => {
                            log::warn!("Consolidation of {id} rolled back: {e}");
                            report.failed.push(id);
                        }
                    }
                }
                Ok(report)
            }
        }
    }

    fn conversation(&self, conversation_id: &str) -> MemxResult<ConsolidationReport> {
        let handle = self.episodic.log(conversation_id)?;
        let (pending, digest) = {
            let log = lock(&handle);
            (log.pending(), log.digest().to_string())
        };
        if pending.is_empty() {
            return Ok(ConsolidationReport::default());
        }

        let now = now_micros();
        let plan = self
            .plan(&pending, now)
            .map_err(|e| batch_error(conversation_id, e))?;
        if plan.is_empty() {
            log::debug!(
                "Consolidation of {conversation_id}: {} pending, nothing settled",
                pending.len()
            );
            return Ok(ConsolidationReport::default());
        }
        let new_digest = self
            .fold_digest(&digest, &plan.summaries)
            .map_err(|e| batch_error(conversation_id, e))?;
        self.cancel.check()?;

        let changes = plan.changes();
        let run = BatchRun {
            processed_up_to: plan.processed_up_to,
            committed_at: now,
        };
        let commit_log = || -> MemxResult<()> {
            let mut log = lock(&handle);
            log.commit_batch(&changes, new_digest.clone(), Some(run))
        };

        let committed = if plan.promotions.is_empty() {
            commit_log()
        } else {
            self.graph.transaction_then(
                |graph| {
                    for (id, extraction) in &plan.promotions {
                        apply_extraction(graph, *id, extraction, now)?;
                    }
                    Ok(())
                },
                |_| commit_log(),
            )
        };
        committed.map_err(|e| batch_error(conversation_id, e))?;

        for &id in &plan.prunes {
            self.index.remove(&embedding_key(id));
        }

        let report = ConsolidationReport {
            promoted: plan.promotions.len(),
            summarized: plan.summaries.len(),
            pruned: plan.prunes.len(),
            failed: Vec::new(),
        };
        log::info!(
            "Consolidated {conversation_id}: promoted={} summarized={} pruned={}",
            report.promoted,
            report.summarized,
            report.pruned
        );
        Ok(report)
    }

    /// Partition pending interactions by score and age.
    fn plan(&self, pending: &[Interaction], now: u64) -> MemxResult<BatchPlan> {
        let retention = self.policy.retention_age_secs.saturating_mul(MICROS_PER_SEC);
        let ceiling = self.policy.prune_age_secs.saturating_mul(MICROS_PER_SEC);
        let mut plan = BatchPlan::default();

        for interaction in pending {
            self.cancel.check()?;
            plan.processed_up_to = plan.processed_up_to.max(interaction.timestamp);
            let age = interaction.age_micros(now);

            if interaction.surprise_score >= self.policy.t_high {
                let extraction = self.extractor.extract(&interaction.content)?;
                plan.promotions.push((interaction.id, extraction));
            } else if age >= ceiling {
                plan.prunes.push(interaction.id);
            } else if interaction.surprise_score < self.policy.t_low && age >= retention {
                plan.summaries.push(interaction.clone());
            }
        }
        Ok(plan)
    }

    /// Merge newly summarized interactions into the rolling digest.
    fn fold_digest(&self, digest: &str, summaries: &[Interaction]) -> MemxResult<Option<String>> {
        if summaries.is_empty() {
            return Ok(None);
        }
        let mut text = digest.trim().to_string();
        for interaction in summaries {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!(
                "[{}] {}",
                interaction.role,
                interaction.content.trim()
            ));
        }
        let len = text.chars().count();
        let ratio = (DIGEST_MAX_CHARS as f32 / len as f32).min(1.0);
        let compressed = self.compressor.compress(&text, None, ratio)?;
        Ok(Some(compressed.compressed_text))
    }
}

/// Wrap a mid-batch failure. Cancellation passes through untouched.
fn batch_error(scope: &str, e: MemxError) -> MemxError {
    match e {
        MemxError::Cancelled | MemxError::ConsolidationBatch { .. } => e,
        other => MemxError::ConsolidationBatch {
            scope: scope.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Upsert one interaction's entities and relations with it as provenance.
fn apply_extraction(
    graph: &mut KnowledgeGraph,
    source: InteractionId,
    extraction: &Extraction,
    now: u64,
) -> MemxResult<()> {
    let sources = BTreeSet::from([source]);
    let mut ids: HashMap<String, u64> = HashMap::new();

    for entity in &extraction.entities {
        let kind = serde_json::to_value(entity.kind)?;
        let attributes = BTreeMap::from([("kind".to_string(), kind)]);
        let (id, _) = graph.upsert_node(&entity.label, attributes, &sources, now)?;
        ids.insert(entity.label.clone(), id);
    }
    for relation in &extraction.relations {
        let (Some(&from), Some(&to)) = (ids.get(&relation.from), ids.get(&relation.to)) else {
            continue;
        };
        graph.upsert_edge(from, to, &relation.relation, relation.weight, &sources, now)?;
    }
    Ok(())
}

/// Attributes given to a node asserted directly through the tool surface.
pub(crate) fn asserted_attributes(
    mut attributes: BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    attributes
        .entry("kind".to_string())
        .or_insert_with(|| Value::String("asserted".to_string()));
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(id: &str) -> ConsolidationScope {
        ConsolidationScope::Conversation(id.to_string())
    }

    #[test]
    fn same_conversation_conflicts() {
        let locks = ScopeLocks::default();
        let _held = locks.acquire(&conv("c1")).unwrap();
        let err = locks.acquire(&conv("c1")).err().unwrap();
        assert!(matches!(err, MemxError::ConcurrencyConflict(_)));
        assert!(locks.acquire(&conv("c2")).is_ok());
    }

    #[test]
    fn global_run_excludes_everything() {
        let locks = ScopeLocks::default();
        {
            let _conversation = locks.acquire(&conv("c1")).unwrap();
            assert!(locks.acquire(&ConsolidationScope::All).is_err());
        }
        let _global = locks.acquire(&ConsolidationScope::All).unwrap();
        assert!(locks.acquire(&conv("c1")).is_err());
        assert!(locks.acquire(&ConsolidationScope::All).is_err());
    }

    #[test]
    fn released_on_drop() {
        let locks = ScopeLocks::default();
        drop(locks.acquire(&ConsolidationScope::All).unwrap());
        assert!(locks.acquire(&ConsolidationScope::All).is_ok());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(MemxError::Cancelled)));
    }
}
