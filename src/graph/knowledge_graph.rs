//! Core graph structure: nodes + edges with label, edge-key and adjacency indexes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use crate::types::knowledge::{normalize_label, validate_label, validate_weight};
use crate::types::{
    EdgeId, InteractionId, KnowledgeEdge, KnowledgeNode, MemxError, MemxResult, NodeId, NodeRef,
};

type EdgeKey = (NodeId, NodeId, String);

/// In-memory knowledge graph. Cycles and self-loops are allowed.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    /// All nodes, in insertion order.
    nodes: Vec<KnowledgeNode>,
    /// All edges, in insertion order.
    edges: Vec<KnowledgeEdge>,
    /// Normalized label -> node id.
    label_index: HashMap<String, NodeId>,
    node_pos: HashMap<NodeId, usize>,
    edge_pos: HashMap<EdgeId, usize>,
    edge_index: HashMap<EdgeKey, EdgeId>,
    /// from_id -> outgoing edge positions, insertion order.
    adjacency: HashMap<NodeId, Vec<usize>>,
    /// to_id -> incoming edge positions, insertion order.
    reverse_adjacency: HashMap<NodeId, Vec<usize>>,
    next_node_id: NodeId,
    next_edge_id: EdgeId,
}

impl KnowledgeGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from pre-existing data (used when loading from disk).
    pub fn from_parts(nodes: Vec<KnowledgeNode>, edges: Vec<KnowledgeEdge>) -> MemxResult<Self> {
        let mut graph = Self::new();
        for node in nodes {
            let key = normalize_label(&node.label);
            if graph.label_index.contains_key(&key) {
                return Err(MemxError::Validation(format!(
                    "duplicate node label in stored graph: {}",
                    node.label
                )));
            }
            graph.next_node_id = graph.next_node_id.max(node.id + 1);
            graph.label_index.insert(key, node.id);
            graph.node_pos.insert(node.id, graph.nodes.len());
            graph.nodes.push(node);
        }
        for edge in edges {
            if !graph.node_pos.contains_key(&edge.from_id) {
                return Err(MemxError::not_found("node", edge.from_id));
            }
            if !graph.node_pos.contains_key(&edge.to_id) {
                return Err(MemxError::not_found("node", edge.to_id));
            }
            graph.next_edge_id = graph.next_edge_id.max(edge.id + 1);
            graph.insert_edge(edge);
        }
        Ok(graph)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All nodes (insertion order).
    pub fn nodes(&self) -> &[KnowledgeNode] {
        &self.nodes
    }

    /// All edges (insertion order).
    pub fn edges(&self) -> &[KnowledgeEdge] {
        &self.edges
    }

    pub fn get_node(&self, id: NodeId) -> Option<&KnowledgeNode> {
        self.node_pos.get(&id).map(|&pos| &self.nodes[pos])
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&KnowledgeEdge> {
        self.edge_pos.get(&id).map(|&pos| &self.edges[pos])
    }

    /// Find a node by label equality (case-insensitive, whitespace-collapsed).
    pub fn find_by_label(&self, label: &str) -> Option<&KnowledgeNode> {
        self.label_index
            .get(&normalize_label(label))
            .and_then(|&id| self.get_node(id))
    }

    /// Resolve an id or label to an existing node id.
    pub fn resolve(&self, node: &NodeRef) -> MemxResult<NodeId> {
        match node {
            NodeRef::Id(id) => self
                .get_node(*id)
                .map(|n| n.id)
                .ok_or_else(|| MemxError::not_found("node", id)),
            NodeRef::Label(label) => self
                .find_by_label(label)
                .map(|n| n.id)
                .ok_or_else(|| MemxError::not_found("node", label)),
        }
    }

    /// Outgoing edges of a node, in insertion order.
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &KnowledgeEdge> {
        self.adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&pos| &self.edges[pos])
    }

    /// Incoming edges of a node, in insertion order.
    pub fn edges_to(&self, id: NodeId) -> impl Iterator<Item = &KnowledgeEdge> {
        self.reverse_adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&pos| &self.edges[pos])
    }

    /// Number of distinct incoming edges.
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.reverse_adjacency.get(&id).map_or(0, |v| v.len())
    }

    /// Insert a node or merge into the existing node with an equal label.
    ///
    /// Merging overwrites the attribute keys supplied and unions provenance.
    /// Returns the node id and whether it was newly created.
    pub fn upsert_node(
        &mut self,
        label: &str,
        attributes: BTreeMap<String, Value>,
        source_ids: &BTreeSet<InteractionId>,
        now: u64,
    ) -> MemxResult<(NodeId, bool)> {
        validate_label(label)?;
        require_provenance(source_ids)?;

        let key = normalize_label(label);
        if let Some(&id) = self.label_index.get(&key) {
            let pos = self.node_pos[&id];
            let node = &mut self.nodes[pos];
            node.attributes.extend(attributes);
            node.source_interaction_ids.extend(source_ids.iter().copied());
            return Ok((id, false));
        }

        let id = self.next_node_id;
        self.next_node_id += 1;
        self.label_index.insert(key, id);
        self.node_pos.insert(id, self.nodes.len());
        self.nodes.push(KnowledgeNode {
            id,
            label: label.trim().to_string(),
            attributes,
            created_at: now,
            source_interaction_ids: source_ids.clone(),
        });
        Ok((id, true))
    }

    /// Insert an edge or merge into the existing `(from, to, relation)` edge,
    /// keeping the larger weight and unioning provenance.
    pub fn upsert_edge(
        &mut self,
        from_id: NodeId,
        to_id: NodeId,
        relation: &str,
        weight: f32,
        source_ids: &BTreeSet<InteractionId>,
        now: u64,
    ) -> MemxResult<(EdgeId, bool)> {
        let relation = relation.trim();
        if relation.is_empty() {
            return Err(MemxError::Validation(
                "relation must not be empty".to_string(),
            ));
        }
        validate_weight(weight)?;
        require_provenance(source_ids)?;
        if self.get_node(from_id).is_none() {
            return Err(MemxError::not_found("node", from_id));
        }
        if self.get_node(to_id).is_none() {
            return Err(MemxError::not_found("node", to_id));
        }

        let key = (from_id, to_id, relation.to_lowercase());
        if let Some(&id) = self.edge_index.get(&key) {
            let pos = self.edge_pos[&id];
            let edge = &mut self.edges[pos];
            edge.weight = edge.weight.max(weight);
            edge.source_interaction_ids.extend(source_ids.iter().copied());
            return Ok((id, false));
        }

        let id = self.next_edge_id;
        self.next_edge_id += 1;
        self.insert_edge(KnowledgeEdge {
            id,
            from_id,
            to_id,
            relation: relation.to_string(),
            weight,
            created_at: now,
            source_interaction_ids: source_ids.clone(),
        });
        Ok((id, true))
    }

    fn insert_edge(&mut self, edge: KnowledgeEdge) {
        let pos = self.edges.len();
        self.edge_index.insert(
            (edge.from_id, edge.to_id, edge.relation.to_lowercase()),
            edge.id,
        );
        self.edge_pos.insert(edge.id, pos);
        self.adjacency.entry(edge.from_id).or_default().push(pos);
        self.reverse_adjacency.entry(edge.to_id).or_default().push(pos);
        self.edges.push(edge);
    }
}

fn require_provenance(source_ids: &BTreeSet<InteractionId>) -> MemxResult<()> {
    if source_ids.is_empty() {
        return Err(MemxError::Validation(
            "knowledge must carry at least one source interaction id".to_string(),
        ));
    }
    Ok(())
}
