//! Durable wrapper around [`KnowledgeGraph`]: one lock, one `graph.json`.

use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::store::fsio::{read_json_opt, write_json_atomic};
use crate::store::StoreLayout;
use crate::sync::{read, write};
use crate::types::{KnowledgeEdge, KnowledgeNode, MemxResult, NodeRef};

use super::{bfs_paths, GraphPath, KnowledgeGraph, TraversalParams};

const GRAPH_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct GraphFile {
    version: u32,
    nodes: Vec<KnowledgeNode>,
    edges: Vec<KnowledgeEdge>,
}

#[derive(Serialize)]
struct GraphFileRef<'a> {
    version: u32,
    nodes: &'a [KnowledgeNode],
    edges: &'a [KnowledgeEdge],
}

/// Shared, persisted knowledge graph.
///
/// Every mutation runs against a staged copy which is written to disk before
/// it replaces the live graph, so readers never observe a half-applied batch.
pub struct GraphStore {
    path: PathBuf,
    graph: RwLock<KnowledgeGraph>,
}

impl GraphStore {
    pub fn open(layout: &StoreLayout) -> MemxResult<Self> {
        let path = layout.graph_path();
        let graph = match read_json_opt::<GraphFile>(&path)? {
            Some(file) => KnowledgeGraph::from_parts(file.nodes, file.edges)?,
            None => KnowledgeGraph::new(),
        };
        log::debug!(
            "Loaded knowledge graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(Self {
            path,
            graph: RwLock::new(graph),
        })
    }

    /// Shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, KnowledgeGraph> {
        read(&self.graph)
    }

    /// Apply `f` to a staged copy and commit it atomically.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut KnowledgeGraph) -> MemxResult<R>,
    ) -> MemxResult<R> {
        self.transaction_then(f, |_| Ok(()))
    }

    /// Like [`transaction`](Self::transaction), but runs `after` once the new
    /// graph is on disk and before it becomes visible. If `after` fails the
    /// previous graph is written back and the error is returned.
    pub fn transaction_then<R>(
        &self,
        f: impl FnOnce(&mut KnowledgeGraph) -> MemxResult<R>,
        after: impl FnOnce(&R) -> MemxResult<()>,
    ) -> MemxResult<R> {
        let mut live = write(&self.graph);
        let mut staged = live.clone();
        let result = f(&mut staged)?;
        self.persist(&staged)?;

        if let Err(e) = after(&result) {
            if let Err(restore) = self.persist(&live) {
                log::error!("Failed to restore knowledge graph after aborted batch: {restore}");
            }
            return Err(e);
        }

        *live = staged;
        Ok(result)
    }

    /// Breadth-first paths from `start`.
    pub fn traverse(&self, start: &NodeRef, params: TraversalParams) -> MemxResult<Vec<GraphPath>> {
        let graph = self.read();
        let start_id = graph.resolve(start)?;
        bfs_paths(&graph, start_id, params)
    }

    fn persist(&self, graph: &KnowledgeGraph) -> MemxResult<()> {
        write_json_atomic(
            &self.path,
            &GraphFileRef {
                version: GRAPH_FILE_VERSION,
                nodes: graph.nodes(),
                edges: graph.edges(),
            },
        )
    }
}
