//! Bounded breadth-first traversal that returns paths with their evidence.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::types::{EdgeId, InteractionId, MemxError, MemxResult, NodeId, MAX_TRAVERSAL_HOPS};

use super::KnowledgeGraph;

/// Traversal bounds.
#[derive(Debug, Clone, Copy)]
pub struct TraversalParams {
    /// Maximum number of edges in a returned path (1..=16).
    pub max_hops: u32,
    /// Edges lighter than this are not followed.
    pub min_edge_weight: f32,
}

impl TraversalParams {
    pub fn new(max_hops: u32) -> Self {
        Self {
            max_hops,
            min_edge_weight: 0.0,
        }
    }
}

/// One edge along a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub edge_id: EdgeId,
    pub from_id: NodeId,
    pub from_label: String,
    pub relation: String,
    pub to_id: NodeId,
    pub to_label: String,
    pub weight: f32,
}

/// Shortest discovered path from the start node to one reachable node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPath {
    pub start_id: NodeId,
    pub end_id: NodeId,
    pub end_label: String,
    pub hops: u32,
    pub steps: Vec<PathStep>,
    /// Union of the provenance of every edge on the path.
    pub evidence: BTreeSet<InteractionId>,
}

/// BFS from `start_id`, following outgoing edges.
///
/// Each node is visited at most once, so cyclic graphs terminate. Heavier
/// edges are expanded first and ties break by edge id, which makes the
/// result order stable for a given graph.
///
/// The ordering is per parent: a node reachable over several equally short
/// paths keeps the one through whichever parent was dequeued first, even if
/// another parent reaches it over a heavier final edge.
pub fn bfs_paths(
    graph: &KnowledgeGraph,
    start_id: NodeId,
    params: TraversalParams,
) -> MemxResult<Vec<GraphPath>> {
    if params.max_hops == 0 || params.max_hops > MAX_TRAVERSAL_HOPS {
        return Err(MemxError::Validation(format!(
            "max_hops must be between 1 and {MAX_TRAVERSAL_HOPS}, got {}",
            params.max_hops
        )));
    }
    if graph.get_node(start_id).is_none() {
        return Err(MemxError::not_found("node", start_id));
    }

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut discovered: Vec<NodeId> = Vec::new();
    // node -> (parent node, edge used to reach it)
    let mut parents: HashMap<NodeId, (NodeId, EdgeId)> = HashMap::new();
    let mut queue: VecDeque<(NodeId, u32)> = VecDeque::new();

    visited.insert(start_id);
    queue.push_back((start_id, 0));

    while let Some((current_id, depth)) = queue.pop_front() {
        if depth >= params.max_hops {
            continue;
        }

        let mut outgoing: Vec<_> = graph
            .edges_from(current_id)
            .filter(|e| e.weight >= params.min_edge_weight)
            .collect();
        outgoing.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.id.cmp(&b.id)));

        for edge in outgoing {
            if visited.insert(edge.to_id) {
                parents.insert(edge.to_id, (current_id, edge.id));
                discovered.push(edge.to_id);
                queue.push_back((edge.to_id, depth + 1));
            }
        }
    }

    let mut paths = Vec::with_capacity(discovered.len());
    for end_id in discovered {
        paths.push(build_path(graph, start_id, end_id, &parents)?);
    }
    Ok(paths)
}

fn build_path(
    graph: &KnowledgeGraph,
    start_id: NodeId,
    end_id: NodeId,
    parents: &HashMap<NodeId, (NodeId, EdgeId)>,
) -> MemxResult<GraphPath> {
    let mut steps = Vec::new();
    let mut evidence = BTreeSet::new();
    let mut cursor = end_id;

    while cursor != start_id {
        let &(parent, edge_id) = parents
            .get(&cursor)
            .ok_or_else(|| MemxError::not_found("node", cursor))?;
        let edge = graph
            .get_edge(edge_id)
            .ok_or_else(|| MemxError::not_found("edge", edge_id))?;
        evidence.extend(edge.source_interaction_ids.iter().copied());
        steps.push(PathStep {
            edge_id,
            from_id: edge.from_id,
            from_label: label_of(graph, edge.from_id),
            relation: edge.relation.clone(),
            to_id: edge.to_id,
            to_label: label_of(graph, edge.to_id),
            weight: edge.weight,
        });
        cursor = parent;
    }
    steps.reverse();

    Ok(GraphPath {
        start_id,
        end_id,
        end_label: label_of(graph, end_id),
        hops: steps.len() as u32,
        steps,
        evidence,
    })
}

fn label_of(graph: &KnowledgeGraph, id: NodeId) -> String {
    graph
        .get_node(id)
        .map(|n| n.label.clone())
        .unwrap_or_default()
}
