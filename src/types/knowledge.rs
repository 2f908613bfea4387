//! Knowledge graph nodes and edges: the crystallized semantic tier.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{EdgeId, InteractionId, NodeId, MAX_LABEL_LEN};
use crate::types::error::{MemxError, MemxResult};

/// An entity extracted from (or asserted by) one or more interactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: NodeId,
    /// Display label; upserts match on [`normalize_label`] of this.
    pub label: String,
    /// Free-form attributes; later upserts overwrite keys they supply.
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Unix epoch microseconds.
    pub created_at: u64,
    /// Interactions backing this node. Only ever grows.
    pub source_interaction_ids: BTreeSet<InteractionId>,
}

/// A directed, weighted relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    pub id: EdgeId,
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub relation: String,
    /// Strength of relationship (0.0 = weak, 1.0 = strong).
    pub weight: f32,
    /// Unix epoch microseconds.
    pub created_at: u64,
    /// Interactions backing this edge. Only ever grows.
    pub source_interaction_ids: BTreeSet<InteractionId>,
}

/// How a caller names a node: by id or by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Id(NodeId),
    Label(String),
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for NodeRef {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(label: String) -> Self {
        Self::Label(label)
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

/// Canonical form used for label equality: trimmed, whitespace collapsed, lowercased.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Validate a label for insertion.
pub fn validate_label(label: &str) -> MemxResult<()> {
    if label.trim().is_empty() {
        return Err(MemxError::Validation("label must not be empty".to_string()));
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(MemxError::Validation(format!(
            "label exceeds maximum length: {} > {}",
            label.len(),
            MAX_LABEL_LEN
        )));
    }
    Ok(())
}

/// Validate an edge weight (must lie in [0.0, 1.0]).
pub fn validate_weight(weight: f32) -> MemxResult<()> {
    if !(0.0..=1.0).contains(&weight) {
        return Err(MemxError::Validation(format!(
            "weight value out of range [0.0, 1.0]: {weight}"
        )));
    }
    Ok(())
}
