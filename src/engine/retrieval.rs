//! Retrieval fan-out: episodic nearest neighbors plus graph evidence.

use std::collections::HashSet;

use serde::Serialize;

use crate::graph::{bfs_paths, GraphPath, KnowledgeGraph, TraversalParams};
use crate::index::VectorIndex;
use crate::services::Extraction;
use crate::store::episodic::interaction_id_from_key;
use crate::store::EpisodicStore;
use crate::types::{InteractionId, InteractionStatus, KnowledgeNode, MemxResult};

/// One ranked retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedItem {
    pub content: String,
    pub score: f32,
    /// `episodic:current`, `episodic:past:<conversation_id>` or `graph`.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<InteractionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Interactions backing a graph item.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<InteractionId>,
}

impl RetrievedItem {
    fn is_episodic(&self) -> bool {
        self.source.starts_with("episodic")
    }

    fn tie_id(&self) -> u64 {
        self.interaction_id.or(self.node_id).unwrap_or(u64::MAX)
    }
}

/// Result of `retrieve_memory`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub query: String,
    /// Conversation treated as "current" for source tagging, if any.
    pub conversation_id: Option<String>,
    pub items: Vec<RetrievedItem>,
}

/// Nearest interactions across every conversation, pruned ones excluded.
pub(crate) fn episodic_candidates(
    episodic: &EpisodicStore,
    index: &dyn VectorIndex,
    query: &[f32],
    current: Option<&str>,
    k: usize,
) -> Vec<RetrievedItem> {
    index
        .nearest(query, None, k)
        .into_iter()
        .filter_map(|neighbor| {
            let id = interaction_id_from_key(&neighbor.key)?;
            let interaction = episodic.get(id).ok()?;
            if interaction.status == InteractionStatus::Pruned || interaction.content.is_empty() {
                return None;
            }
            let source = if current == Some(interaction.conversation_id.as_str()) {
                "episodic:current".to_string()
            } else {
                format!("episodic:past:{}", interaction.conversation_id)
            };
            Some(RetrievedItem {
                content: interaction.content,
                score: neighbor.similarity.clamp(0.0, 1.0),
                source,
                interaction_id: Some(id),
                conversation_id: Some(interaction.conversation_id),
                node_id: None,
                timestamp: Some(interaction.timestamp),
                evidence: Vec::new(),
            })
        })
        .collect()
}

/// Nodes named in the query and the paths leading out of them.
pub(crate) fn graph_candidates(
    graph: &KnowledgeGraph,
    extraction: &Extraction,
    params: TraversalParams,
) -> MemxResult<Vec<RetrievedItem>> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for entity in &extraction.entities {
        let Some(node) = graph.find_by_label(&entity.label) else {
            continue;
        };
        if !seen.insert(node.id) {
            continue;
        }
        items.push(node_item(node));
        for path in bfs_paths(graph, node.id, params)? {
            items.push(path_item(&path));
        }
    }
    Ok(items)
}

fn node_item(node: &KnowledgeNode) -> RetrievedItem {
    let mut content = node.label.clone();
    let shown: Vec<String> = node
        .attributes
        .iter()
        .filter(|(k, _)| k.as_str() != "kind")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    if !shown.is_empty() {
        content.push_str(&format!(" [{}]", shown.join(", ")));
    }
    RetrievedItem {
        content,
        score: 1.0,
        source: "graph".to_string(),
        interaction_id: None,
        conversation_id: None,
        node_id: Some(node.id),
        timestamp: Some(node.created_at),
        evidence: node.source_interaction_ids.iter().copied().collect(),
    }
}

fn path_item(path: &GraphPath) -> RetrievedItem {
    let mut content = path
        .steps
        .first()
        .map(|s| s.from_label.clone())
        .unwrap_or_default();
    let mut score = 1.0f32;
    for step in &path.steps {
        content.push_str(&format!(" --{}--> {}", step.relation, step.to_label));
        score *= step.weight;
    }
    RetrievedItem {
        content,
        score,
        source: "graph".to_string(),
        interaction_id: None,
        conversation_id: None,
        node_id: Some(path.end_id),
        timestamp: None,
        evidence: path.evidence.iter().copied().collect(),
    }
}

/// Score descending; ties put episodic before graph, then lower ids first.
pub(crate) fn rank(mut items: Vec<RetrievedItem>, top_k: usize) -> Vec<RetrievedItem> {
    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.is_episodic().cmp(&a.is_episodic()))
            .then(a.tie_id().cmp(&b.tie_id()))
    });
    items.truncate(top_k);
    items
}
