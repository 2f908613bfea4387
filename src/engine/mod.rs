//! The engine context: one explicit object owning every tier.
//!
//! [`MemoryEngine::open`] creates the root layout and loads the registry,
//! episodic logs, graph and auto-ingest state, then rebuilds the vector
//! index. [`MemoryEngine::shutdown`] (or drop) stops background work and
//! flushes pending registry updates.

pub mod consolidate;
pub mod retrieval;
pub(crate) mod scheduler;
pub mod surprise;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::activity::{ActivityAggregator, ActivityReport};
use crate::config::{ConsolidationPolicy, EngineConfig};
use crate::graph::{GraphPath, GraphStore, TraversalParams};
use crate::ingest::{AutoIngestController, AutoIngestStatus, IngestKind};
use crate::services::{Collaborators, Compression, Snapshot};
use crate::store::episodic::embedding_key;
use crate::store::{
    normalize_project_key, ConversationCheckpoint, EpisodicStore, ResolvedConversation,
    RootLock, SessionRegistry, StoreLayout,
};
use crate::sync::lock;
use crate::types::knowledge::{validate_label, validate_weight};
use crate::types::{
    now_micros, ConversationSession, EdgeId, Interaction, InteractionId, InteractionStatus,
    KnowledgeEdge, KnowledgeNode, MemxError, MemxResult, NewInteraction, NodeId, NodeRef, Role,
    DEFAULT_TRAVERSAL_HOPS,
};

use consolidate::{asserted_attributes, Consolidator, ScopeLocks};
use scheduler::Scheduler;

pub use consolidate::{CancelToken, ConsolidationReport, ConsolidationScope};
pub use retrieval::{RetrievalResult, RetrievedItem};
pub use surprise::{SurpriseBreakdown, SurpriseScorer};

/// Characters of retrieval output echoed into an auto-logged response.
const RESPONSE_ECHO_CHARS: usize = 200;

/// Result of an ingest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResult {
    pub id: InteractionId,
    pub conversation_id: String,
    pub project_key: String,
    pub surprise_score: f32,
}

/// Result of `add_knowledge_node`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeResult {
    pub id: NodeId,
    pub label: String,
    /// False when the label matched an existing node.
    pub created: bool,
    /// Interaction recording the assertion.
    pub provenance_id: InteractionId,
}

/// Result of `add_knowledge_edge`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeResult {
    pub id: EdgeId,
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub relation: String,
    /// Weight after merging with any existing edge.
    pub weight: f32,
    pub created: bool,
    pub provenance_id: InteractionId,
}

/// Shared state behind the engine, also owned by the background scheduler.
pub(crate) struct EngineInner {
    config: EngineConfig,
    layout: StoreLayout,
    project_key: String,
    registry: SessionRegistry,
    episodic: EpisodicStore,
    graph: GraphStore,
    auto_ingest: AutoIngestController,
    collaborators: Collaborators,
    scorer: SurpriseScorer,
    scope_locks: ScopeLocks,
    /// Released last, after every store has flushed.
    _root_lock: RootLock,
}

impl EngineInner {
    /// Run one consolidation holding the scope's in-flight lock.
    pub(crate) fn consolidate(
        &self,
        scope: &ConsolidationScope,
        policy: ConsolidationPolicy,
        cancel: &CancelToken,
    ) -> MemxResult<ConsolidationReport> {
        let _guard = self.scope_locks.acquire(scope)?;
        let consolidator = Consolidator {
            episodic: &self.episodic,
            graph: &self.graph,
            index: self.collaborators.index.as_ref(),
            extractor: self.collaborators.extractor.as_ref(),
            compressor: self.collaborators.compressor.as_ref(),
            policy,
            cancel,
        };
        consolidator.run(scope).inspect_err(|e| {
            log::warn!("Consolidation of {scope} failed, checkpoint unmoved: {e}");
        })
    }
}

/// The memory engine.
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl MemoryEngine {
    /// Open with the local collaborators.
    pub fn open(config: EngineConfig) -> MemxResult<Self> {
        let collaborators = Collaborators::local(&config);
        Self::open_with(config, collaborators)
    }

    /// Open with caller-supplied collaborators.
    pub fn open_with(config: EngineConfig, collaborators: Collaborators) -> MemxResult<Self> {
        config.validate()?;
        let layout = StoreLayout::new(&config.root_dir);
        layout.ensure()?;
        let root_lock = RootLock::acquire(&layout)?;

        let project_key = match &config.project_key {
            Some(key) => normalize_project_key(key)?,
            None => normalize_project_key(&std::env::current_dir()?.to_string_lossy())?,
        };

        let registry = SessionRegistry::open(&layout)?;
        let episodic = EpisodicStore::open(layout.clone())?;
        let graph = GraphStore::open(&layout)?;
        let auto_ingest = AutoIngestController::new(&layout);

        let mut indexed = 0usize;
        for conversation_id in episodic.conversation_ids() {
            for interaction in episodic.interactions(&conversation_id)? {
                if interaction.status == InteractionStatus::Pruned || interaction.content.is_empty() {
                    continue;
                }
                let vector = collaborators.embedder.embed(&interaction.content)?;
                collaborators
                    .index
                    .upsert(&embedding_key(interaction.id), &conversation_id, vector);
                indexed += 1;
            }
        }

        let scorer = SurpriseScorer::new(
            config.scorer.clone(),
            collaborators.embedder.clone(),
            collaborators.index.clone(),
            collaborators.extractor.clone(),
        );

        log::info!(
            "Opened memory at {} (project {project_key}, {indexed} interactions indexed)",
            layout.root().display()
        );

        let schedule = config
            .consolidation
            .schedule_interval_secs
            .zip(config.consolidation.policy);
        let inner = Arc::new(EngineInner {
            config,
            layout,
            project_key,
            registry,
            episodic,
            graph,
            auto_ingest,
            collaborators,
            scorer,
            scope_locks: ScopeLocks::default(),
            _root_lock: root_lock,
        });

        let scheduler = match schedule {
            Some((secs, policy)) => Some(Scheduler::start(
                inner.clone(),
                policy,
                Duration::from_secs(secs),
            )?),
            None => None,
        };

        Ok(Self {
            inner,
            scheduler: Mutex::new(scheduler),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn root(&self) -> &Path {
        self.inner.layout.root()
    }

    /// Project key of the current working context.
    pub fn project_key(&self) -> &str {
        &self.inner.project_key
    }

    // ==================== Sessions ====================

    /// Active conversation for `project_key` (default: current project),
    /// created if the project has none.
    pub fn resolve_conversation(&self, project_key: Option<&str>) -> MemxResult<ResolvedConversation> {
        let key = project_key.unwrap_or(&self.inner.project_key);
        let resolved = self.inner.registry.resolve(key)?;
        self.inner
            .episodic
            .ensure_conversation(&resolved.conversation_id, &resolved.project_key)?;
        Ok(resolved)
    }

    /// Archive the project's active conversation and start a new one.
    pub fn start_new_conversation(
        &self,
        project_key: Option<&str>,
    ) -> MemxResult<ResolvedConversation> {
        let key = project_key.unwrap_or(&self.inner.project_key);
        let resolved = self.inner.registry.start_new(key)?;
        self.inner
            .episodic
            .ensure_conversation(&resolved.conversation_id, &resolved.project_key)?;
        Ok(resolved)
    }

    /// Every project known to the registry.
    pub fn projects(&self) -> Vec<(String, crate::store::ProjectEntry)> {
        self.inner.registry.projects()
    }

    /// A session by conversation id, active or archived.
    pub fn session(&self, conversation_id: &str) -> Option<ConversationSession> {
        self.inner.registry.session(conversation_id)
    }

    /// Explicit conversation (must exist) or the current project's active one.
    fn conversation_target(&self, conversation_id: Option<&str>) -> MemxResult<String> {
        let Some(id) = conversation_id else {
            return Ok(self.resolve_conversation(None)?.conversation_id);
        };
        if self.inner.episodic.contains(id) {
            return Ok(id.to_string());
        }
        match self.inner.registry.project_of(id) {
            Some(project) => {
                self.inner.episodic.ensure_conversation(id, &project)?;
                Ok(id.to_string())
            }
            None => Err(MemxError::not_found("conversation", id)),
        }
    }

    // ==================== Episodic tier ====================

    /// Score and append an interaction.
    pub fn ingest(
        &self,
        conversation_id: Option<&str>,
        role: Role,
        content: &str,
    ) -> MemxResult<IngestResult> {
        let conversation_id = self.conversation_target(conversation_id)?;
        self.ingest_into(&conversation_id, role, content)
    }

    /// Append to the current project's conversation. Role defaults to `user`.
    pub fn log_interaction(&self, content: &str, role: Option<Role>) -> MemxResult<IngestResult> {
        self.ingest(None, role.unwrap_or(Role::User), content)
    }

    fn ingest_into(&self, conversation_id: &str, role: Role, content: &str) -> MemxResult<IngestResult> {
        let inner = &self.inner;
        let embedding = inner.scorer.embed(content)?;
        let familiarity = {
            let graph = inner.graph.read();
            inner.scorer.familiarity(&graph, content)?
        };

        let new = NewInteraction::new(conversation_id, role, content);
        let interaction = inner.episodic.append_scored(
            new,
            |log| Ok(inner.scorer.score(&embedding, log, familiarity).score),
            |appended| {
                inner
                    .collaborators
                    .index
                    .upsert(&embedding_key(appended.id), conversation_id, embedding.clone());
            },
        )?;
        inner.registry.touch(conversation_id, interaction.timestamp);

        Ok(IngestResult {
            id: interaction.id,
            conversation_id: interaction.conversation_id,
            project_key: interaction.project_key,
            surprise_score: interaction.surprise_score,
        })
    }

    /// Append an interaction exactly as given (score and timestamp included),
    /// for imports of already-scored history.
    pub fn record(&self, new: NewInteraction) -> MemxResult<Interaction> {
        let conversation_id = self.conversation_target(Some(&new.conversation_id))?;
        let vector = self.inner.collaborators.embedder.embed(&new.content)?;
        let index = &self.inner.collaborators.index;
        let interaction = self.inner.episodic.append_scored(
            new.clone(),
            |_| Ok(new.surprise_score),
            |appended| index.upsert(&embedding_key(appended.id), &conversation_id, vector),
        )?;
        self.inner
            .registry
            .touch(&conversation_id, interaction.timestamp);
        Ok(interaction)
    }

    /// Surprise of `content` against a conversation, without writing anything.
    pub fn score(&self, content: &str, conversation_id: Option<&str>) -> MemxResult<SurpriseBreakdown> {
        let inner = &self.inner;
        let conversation_id = self.conversation_target(conversation_id)?;
        let embedding = inner.scorer.embed(content)?;
        let familiarity = {
            let graph = inner.graph.read();
            inner.scorer.familiarity(&graph, content)?
        };
        let handle = inner.episodic.log(&conversation_id)?;
        let log = lock(&handle);
        Ok(inner.scorer.score(&embedding, &log, familiarity))
    }

    /// The last `window` interactions of a conversation, oldest first.
    pub fn recent(&self, conversation_id: Option<&str>, window: usize) -> MemxResult<Vec<Interaction>> {
        let conversation_id = self.conversation_target(conversation_id)?;
        self.inner.episodic.recent(&conversation_id, window)
    }

    /// Rolling digest of a conversation's summarized interactions.
    pub fn digest(&self, conversation_id: Option<&str>) -> MemxResult<String> {
        let conversation_id = self.conversation_target(conversation_id)?;
        let handle = self.inner.episodic.log(&conversation_id)?;
        let digest = lock(&handle).digest().to_string();
        Ok(digest)
    }

    /// How far a conversation has been consolidated.
    pub fn checkpoint(&self, conversation_id: Option<&str>) -> MemxResult<ConversationCheckpoint> {
        let conversation_id = self.conversation_target(conversation_id)?;
        let handle = self.inner.episodic.log(&conversation_id)?;
        let checkpoint = lock(&handle).checkpoint();
        Ok(checkpoint)
    }

    /// Look up one interaction.
    pub fn interaction(&self, id: InteractionId) -> MemxResult<Interaction> {
        self.inner.episodic.get(id)
    }

    /// Transition an interaction's status by hand.
    pub fn mark(&self, id: InteractionId, status: InteractionStatus) -> MemxResult<()> {
        self.inner.episodic.mark(id, status)?;
        if status == InteractionStatus::Pruned {
            self.inner.collaborators.index.remove(&embedding_key(id));
        }
        Ok(())
    }

    // ==================== Retrieval ====================

    /// Rank episodic and graph evidence for `query`, then auto-log the
    /// exchange when the project's auto-ingest settings allow it.
    pub fn retrieve(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        top_k: Option<usize>,
    ) -> MemxResult<RetrievalResult> {
        let inner = &self.inner;
        if query.trim().is_empty() {
            return Err(MemxError::Validation("query must not be empty".to_string()));
        }
        let top_k = top_k.unwrap_or(inner.config.retrieval.default_top_k);
        if top_k == 0 {
            return Err(MemxError::Validation("top_k must be positive".to_string()));
        }

        let current = match conversation_id {
            Some(id) => Some(self.conversation_target(Some(id))?),
            None => inner
                .registry
                .active_session(&inner.project_key)?
                .map(|s| s.conversation_id),
        };

        let embedding = inner.collaborators.embedder.embed(query)?;
        let mut items = retrieval::episodic_candidates(
            &inner.episodic,
            inner.collaborators.index.as_ref(),
            &embedding,
            current.as_deref(),
            top_k,
        );
        let extraction = inner.collaborators.extractor.extract(query)?;
        let params = TraversalParams {
            max_hops: inner.config.retrieval.graph_hops,
            min_edge_weight: inner.config.retrieval.min_edge_weight,
        };
        {
            let graph = inner.graph.read();
            items.extend(retrieval::graph_candidates(&graph, &extraction, params)?);
        }
        let items = retrieval::rank(items, top_k);

        self.auto_log_retrieval(query, current.as_deref(), &items);

        Ok(RetrievalResult {
            query: query.to_string(),
            conversation_id: current,
            items,
        })
    }

    /// Best effort: failures are logged and never reach the caller.
    fn auto_log_retrieval(&self, query: &str, current: Option<&str>, items: &[RetrievedItem]) {
        let inner = &self.inner;
        let project = current
            .and_then(|id| inner.registry.project_of(id))
            .unwrap_or_else(|| inner.project_key.clone());
        let log_query = inner.auto_ingest.should_log(&project, IngestKind::Query);
        let log_response =
            !items.is_empty() && inner.auto_ingest.should_log(&project, IngestKind::Response);
        if !log_query && !log_response {
            return;
        }

        let conversation_id = match current {
            Some(id) => id.to_string(),
            None => match self.resolve_conversation(Some(&project)) {
                Ok(resolved) => resolved.conversation_id,
                Err(e) => {
                    log::warn!("Auto-ingest skipped, no conversation for {project}: {e}");
                    return;
                }
            },
        };

        if log_query {
            if let Err(e) = self.ingest_into(&conversation_id, Role::User, query) {
                log::warn!("Auto-ingest of query failed: {e}");
            }
        }
        if log_response {
            let text = items
                .iter()
                .map(|i| i.content.as_str())
                .collect::<Vec<_>>()
                .join("\n---\n");
            let echo: String = text.chars().take(RESPONSE_ECHO_CHARS).collect();
            let response = format!("Memory retrieval: {echo}");
            if let Err(e) = self.ingest_into(&conversation_id, Role::Assistant, &response) {
                log::warn!("Auto-ingest of response failed: {e}");
            }
        }
    }

    // ==================== Consolidation ====================

    /// Consolidate one conversation, or all of them when `conversation_id`
    /// is `None`. `policy` overrides the configured one; one of the two is
    /// required.
    pub fn consolidate(
        &self,
        conversation_id: Option<&str>,
        policy: Option<ConsolidationPolicy>,
    ) -> MemxResult<ConsolidationReport> {
        let policy = policy
            .or(self.inner.config.consolidation.policy)
            .ok_or_else(|| {
                MemxError::Validation(
                    "no consolidation policy: configure [consolidation.policy] or pass \
                     t_high, t_low, retention_age_secs and prune_age_secs"
                        .to_string(),
                )
            })?;
        let scope = match conversation_id {
            Some(id) => ConsolidationScope::Conversation(self.conversation_target(Some(id))?),
            None => ConsolidationScope::All,
        };
        self.consolidate_with(&scope, policy, &CancelToken::new())
    }

    /// Consolidate with an explicit scope and a cancellation token.
    pub fn consolidate_with(
        &self,
        scope: &ConsolidationScope,
        policy: ConsolidationPolicy,
        cancel: &CancelToken,
    ) -> MemxResult<ConsolidationReport> {
        if let ConsolidationScope::Conversation(id) = scope {
            self.conversation_target(Some(id))?;
        }
        self.inner.consolidate(scope, policy, cancel)
    }

    // ==================== Knowledge graph ====================

    /// Upsert a node by label. The assertion is recorded as a `system`
    /// interaction in the current conversation, which becomes its provenance.
    pub fn add_knowledge_node(
        &self,
        label: &str,
        attributes: BTreeMap<String, Value>,
    ) -> MemxResult<NodeResult> {
        validate_label(label)?;
        let label = label.trim();
        let attributes = asserted_attributes(attributes);
        let provenance = self.assertion(&format!("Asserted knowledge node: {label}"))?;

        let sources = BTreeSet::from([provenance]);
        let now = now_micros();
        let result = self.inner.graph.transaction_then(
            |graph| graph.upsert_node(label, attributes, &sources, now),
            |_| self.inner.episodic.mark(provenance, InteractionStatus::Promoted),
        );
        let (id, created) = self.settle_assertion(provenance, result)?;
        log::debug!("Knowledge node {id} '{label}' (created: {created})");
        Ok(NodeResult {
            id,
            label: label.to_string(),
            created,
            provenance_id: provenance,
        })
    }

    /// Upsert an edge between two existing nodes, named by id or label.
    pub fn add_knowledge_edge(
        &self,
        from: &NodeRef,
        to: &NodeRef,
        relation: &str,
        weight: f32,
    ) -> MemxResult<EdgeResult> {
        validate_weight(weight)?;
        let relation = relation.trim();
        if relation.is_empty() {
            return Err(MemxError::Validation(
                "relation must not be empty".to_string(),
            ));
        }
        let (from_label, to_label) = {
            let graph = self.inner.graph.read();
            let from_id = graph.resolve(from)?;
            let to_id = graph.resolve(to)?;
            let label = |id| graph.get_node(id).map(|n| n.label.clone()).unwrap_or_default();
            (label(from_id), label(to_id))
        };
        let provenance = self.assertion(&format!(
            "Asserted knowledge edge: {from_label} --{relation}--> {to_label} (weight {weight})"
        ))?;

        let sources = BTreeSet::from([provenance]);
        let now = now_micros();
        let result = self.inner.graph.transaction_then(
            |graph| {
                let from_id = graph.resolve(from)?;
                let to_id = graph.resolve(to)?;
                let (id, created) =
                    graph.upsert_edge(from_id, to_id, relation, weight, &sources, now)?;
                let merged = graph.get_edge(id).map_or(weight, |e| e.weight);
                Ok(EdgeResult {
                    id,
                    from_id,
                    to_id,
                    relation: relation.to_string(),
                    weight: merged,
                    created,
                    provenance_id: provenance,
                })
            },
            |_| self.inner.episodic.mark(provenance, InteractionStatus::Promoted),
        );
        self.settle_assertion(provenance, result)
    }

    fn assertion(&self, content: &str) -> MemxResult<InteractionId> {
        Ok(self.ingest(None, Role::System, content)?.id)
    }

    /// A failed graph write leaves its provenance interaction orphaned; prune it.
    fn settle_assertion<T>(&self, provenance: InteractionId, result: MemxResult<T>) -> MemxResult<T> {
        if result.is_err() {
            if let Err(e) = self.mark(provenance, InteractionStatus::Pruned) {
                log::warn!("Could not prune orphaned assertion {provenance}: {e}");
            }
        }
        result
    }

    /// Breadth-first paths from `start`.
    pub fn traverse(
        &self,
        start: &NodeRef,
        max_hops: Option<u32>,
        min_edge_weight: Option<f32>,
    ) -> MemxResult<Vec<GraphPath>> {
        let min_edge_weight = min_edge_weight.unwrap_or(0.0);
        validate_weight(min_edge_weight)?;
        let params = TraversalParams {
            max_hops: max_hops.unwrap_or(DEFAULT_TRAVERSAL_HOPS),
            min_edge_weight,
        };
        self.inner.graph.traverse(start, params)
    }

    pub fn node(&self, node: &NodeRef) -> MemxResult<KnowledgeNode> {
        let graph = self.inner.graph.read();
        let id = graph.resolve(node)?;
        graph
            .get_node(id)
            .cloned()
            .ok_or_else(|| MemxError::not_found("node", id))
    }

    /// All nodes, insertion order.
    pub fn nodes(&self) -> Vec<KnowledgeNode> {
        self.inner.graph.read().nodes().to_vec()
    }

    /// All edges, insertion order.
    pub fn edges(&self) -> Vec<KnowledgeEdge> {
        self.inner.graph.read().edges().to_vec()
    }

    // ==================== Collaborators ====================

    pub fn compress_prompt(
        &self,
        text: &str,
        target_ratio: f32,
        instruction: Option<&str>,
    ) -> MemxResult<Compression> {
        self.inner
            .collaborators
            .compressor
            .compress(text, instruction, target_ratio)
    }

    /// Flush pending registry updates, then snapshot every state file.
    pub fn snapshot(&self, message: &str) -> MemxResult<Snapshot> {
        self.inner.registry.flush()?;
        self.inner
            .collaborators
            .snapshotter
            .snapshot(&self.inner.layout, message)
    }

    pub fn list_snapshots(&self) -> MemxResult<Vec<Snapshot>> {
        self.inner.collaborators.snapshotter.list(&self.inner.layout)
    }

    // ==================== Activity & auto-ingest ====================

    pub fn recent_activity(&self, window_hours: f64) -> MemxResult<ActivityReport> {
        ActivityAggregator::new(
            &self.inner.registry,
            &self.inner.episodic,
            &self.inner.config.activity,
        )
        .recent_activity(window_hours, now_micros())
    }

    /// Change auto-ingest settings; overrides apply to `project_key`
    /// (default: current project), `enabled` to the global switch.
    pub fn configure_auto_ingest(
        &self,
        project_key: Option<&str>,
        enabled: Option<bool>,
        log_queries: Option<bool>,
        log_responses: Option<bool>,
    ) -> MemxResult<AutoIngestStatus> {
        let key = self.project_key_or_current(project_key)?;
        self.inner
            .auto_ingest
            .configure(&key, enabled, log_queries, log_responses)
    }

    pub fn auto_ingest_status(&self, project_key: Option<&str>) -> MemxResult<AutoIngestStatus> {
        let key = self.project_key_or_current(project_key)?;
        self.inner.auto_ingest.status(&key)
    }

    fn project_key_or_current(&self, project_key: Option<&str>) -> MemxResult<String> {
        match project_key {
            Some(key) => normalize_project_key(key),
            None => Ok(self.inner.project_key.clone()),
        }
    }

    // ==================== Lifecycle ====================

    /// Stop background consolidation and flush pending writes.
    pub fn shutdown(&self) -> MemxResult<()> {
        if let Some(mut scheduler) = lock(&self.scheduler).take() {
            scheduler.stop();
        }
        self.inner.registry.flush()?;
        log::info!("Memory engine at {} shut down", self.root().display());
        Ok(())
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        if let Some(mut scheduler) = lock(&self.scheduler).take() {
            scheduler.stop();
        }
        if let Err(e) = self.inner.registry.flush() {
            log::warn!("Registry flush on drop failed: {e}");
        }
    }
}
