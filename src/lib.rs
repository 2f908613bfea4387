//! memx: tiered memory consolidation engine for AI agents.
//!
//! Interactions land in a per-conversation episodic log, scored for surprise
//! against what memory already holds. A consolidation pass promotes surprising
//! interactions into a shared knowledge graph, folds routine ones into a
//! rolling digest, and prunes the rest. Snapshots archive the whole state.

pub mod activity;
pub mod cli;
pub mod config;
pub mod engine;
pub mod graph;
pub mod index;
pub mod ingest;
pub mod services;
pub mod store;
mod sync;
pub mod tools;
pub mod transport;
pub mod types;

// Re-export commonly used types at the crate root
pub use activity::{ActivityReport, InteractionSummary, ProjectActivity};
pub use config::{ConsolidationPolicy, EngineConfig, ScorerConfig};
pub use engine::{
    CancelToken, ConsolidationReport, ConsolidationScope, EdgeResult, IngestResult, MemoryEngine,
    NodeResult, RetrievalResult, RetrievedItem, SurpriseBreakdown,
};
pub use graph::{GraphPath, KnowledgeGraph, PathStep, TraversalParams};
pub use index::{cosine_similarity, FlatIndex, VectorIndex};
pub use ingest::{AutoIngestStatus, IngestKind};
pub use services::{
    Collaborators, Compression, Embedder, Extractor, Snapshot, Snapshotter, TextCompressor,
};
pub use store::{ResolvedConversation, StoreLayout};
pub use tools::{ToolCallResult, ToolDefinition, ToolInvoker, ToolRegistry};
pub use types::{
    now_micros, ConversationSession, Interaction, InteractionId, InteractionStatus, KnowledgeEdge,
    KnowledgeNode, MemxError, MemxResult, NewInteraction, NodeRef, Role, SessionStatus,
    MAX_CONTENT_SIZE,
};
