//! Nearest-neighbor index over interaction embeddings.

pub mod vector_index;

pub use vector_index::{cosine_similarity, FlatIndex, Neighbor, VectorIndex};
