//! Text embedding.

use crate::types::MemxResult;

/// Embedding vector.
pub type Embedding = Vec<f32>;

/// Trait for embedding providers.
pub trait Embedder: Send + Sync {
    /// Embed `text`. Identical text must yield an identical vector. Remote
    /// providers report transport failures as errors.
    fn embed(&self, text: &str) -> MemxResult<Embedding>;

    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Provider name.
    fn name(&self) -> &str;
}

/// Feature-hashing embedder: unigrams and bigrams hashed into a fixed number
/// of signed buckets, then L2-normalized. No vocabulary, no training, stable
/// across processes.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, embedding: &mut [f32], feature: &str, weight: f32) {
        let hash = crc32fast::hash(feature.as_bytes());
        let bucket = (hash as usize) % self.dimension;
        let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> MemxResult<Embedding> {
        let mut embedding = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);

        for token in &tokens {
            self.add_feature(&mut embedding, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut embedding, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn test_identical_text_identical_vector() {
        let e = HashingEmbedder::new(128);
        assert_eq!(
            e.embed("The deploy failed").unwrap(),
            e.embed("The deploy failed").unwrap()
        );
    }

    #[test]
    fn test_unrelated_text_low_similarity() {
        let e = HashingEmbedder::new(256);
        let a = e.embed("database migration completed").unwrap();
        let b = e.embed("weather looks sunny tomorrow").unwrap();
        assert!(cosine_similarity(&a, &b) < 0.5);
    }

    #[test]
    fn test_no_tokens_zero_vector() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed("!!! ...").unwrap().iter().all(|&x| x == 0.0));
    }
}
