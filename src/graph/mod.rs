//! Semantic tier: the crystallized knowledge graph.

pub mod knowledge_graph;
pub mod store;
pub mod traversal;

pub use knowledge_graph::KnowledgeGraph;
pub use store::GraphStore;
pub use traversal::{bfs_paths, GraphPath, PathStep, TraversalParams};
