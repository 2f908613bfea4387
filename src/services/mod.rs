//! External collaborators behind narrow traits, each with a local default.
//!
//! The engine only talks to these traits. Swapping in a model-backed
//! embedder or a real VCS snapshotter means handing a different
//! [`Collaborators`] to [`MemoryEngine::open_with`](crate::engine::MemoryEngine::open_with).

pub mod compressor;
pub mod embedder;
pub mod extractor;
pub mod snapshot;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::index::{FlatIndex, VectorIndex};

pub use compressor::{Compression, ExtractiveCompressor, TextCompressor};
pub use embedder::{Embedder, HashingEmbedder};
pub use extractor::{EntityKind, ExtractedEntity, ExtractedRelation, Extraction, Extractor, HeuristicExtractor};
pub use snapshot::{ArchiveSnapshotter, Snapshot, Snapshotter};

/// The set of collaborators an engine runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub extractor: Arc<dyn Extractor>,
    pub compressor: Arc<dyn TextCompressor>,
    pub snapshotter: Arc<dyn Snapshotter>,
}

impl Collaborators {
    /// Deterministic in-process implementations of every collaborator.
    pub fn local(config: &EngineConfig) -> Self {
        Self {
            embedder: Arc::new(HashingEmbedder::new(config.embedding.dimension)),
            index: Arc::new(FlatIndex::new()),
            extractor: Arc::new(HeuristicExtractor::new()),
            compressor: Arc::new(ExtractiveCompressor::new()),
            snapshotter: Arc::new(ArchiveSnapshotter::new()),
        }
    }
}
