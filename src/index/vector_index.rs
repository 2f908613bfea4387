//! Vector index: the nearest-neighbor service behind surprise scoring and recall.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::sync::{read, write};

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub key: String,
    /// Scope the vector was filed under (a conversation id).
    pub scope: String,
    pub similarity: f32,
}

/// Nearest-neighbor service over keyed, scoped vectors.
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector stored under `key`.
    fn upsert(&self, key: &str, scope: &str, vector: Vec<f32>);

    /// Forget `key`. Unknown keys are ignored.
    fn remove(&self, key: &str);

    /// The `k` most similar vectors, most similar first.
    /// `scope = None` searches every scope.
    fn nearest(&self, query: &[f32], scope: Option<&str>, k: usize) -> Vec<Neighbor>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact cosine search over every stored vector.
///
/// Entries are kept in key order so equal similarities always rank the same way.
#[derive(Default)]
pub struct FlatIndex {
    entries: RwLock<BTreeMap<String, (String, Vec<f32>)>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatIndex {
    fn upsert(&self, key: &str, scope: &str, vector: Vec<f32>) {
        write(&self.entries).insert(key.to_string(), (scope.to_string(), vector));
    }

    fn remove(&self, key: &str) {
        write(&self.entries).remove(key);
    }

    fn nearest(&self, query: &[f32], scope: Option<&str>, k: usize) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        let entries = read(&self.entries);
        let mut hits: Vec<Neighbor> = entries
            .iter()
            .filter(|(_, (s, _))| scope.map_or(true, |wanted| s == wanted))
            .map(|(key, (s, vector))| Neighbor {
                key: key.clone(),
                scope: s.clone(),
                similarity: cosine_similarity(query, vector),
            })
            .collect();
        // Stable sort keeps key order for ties.
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        hits
    }

    fn len(&self) -> usize {
        read(&self.entries).len()
    }
}

/// Cosine similarity between two vectors, 0.0 when either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len().min(b.len()) {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}
