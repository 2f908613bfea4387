//! Surprise scoring: how novel an interaction is against existing memory.

use std::sync::Arc;

use serde::Serialize;

use crate::config::ScorerConfig;
use crate::graph::KnowledgeGraph;
use crate::index::VectorIndex;
use crate::services::{Embedder, Extractor};
use crate::store::episodic::interaction_id_from_key;
use crate::store::ConversationLog;
use crate::types::{MemxError, MemxResult};

/// Score plus the terms that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurpriseBreakdown {
    /// Final score in [0.0, 1.0].
    pub score: f32,
    /// Largest recency-discounted similarity to a prior interaction.
    pub max_similarity: f32,
    /// Graph familiarity of the mentioned entities, in [0.0, 1.0].
    pub familiarity: f32,
    /// Number of prior interactions compared against.
    pub neighbors: usize,
}

/// Computes novelty against the conversation's prior interactions.
///
/// Formula: `(1 - max_i sim_i * discount(age_i)) * (1 - frequency_weight * familiarity)`
///
/// - `age_i`: interactions appended since neighbor `i` (memory state only, no clock)
/// - `discount(age) = 1 - recency_weight * (1 - 2^(-age / half_life))`
/// - `familiarity`: mean of `in_degree / (in_degree + saturation)` over the
///   candidate's entities that already exist in the graph
///
/// With no prior interactions the score is exactly 1.0.
pub struct SurpriseScorer {
    config: ScorerConfig,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    extractor: Arc<dyn Extractor>,
}

impl SurpriseScorer {
    pub fn new(
        config: ScorerConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            config,
            embedder,
            index,
            extractor,
        }
    }

    /// Embed candidate content, rejecting text with nothing to score.
    pub fn embed(&self, content: &str) -> MemxResult<Vec<f32>> {
        if content.trim().is_empty() {
            return Err(MemxError::Validation(
                "content must not be empty".to_string(),
            ));
        }
        let embedding = self.embedder.embed(content)?;
        if embedding.iter().all(|&x| x == 0.0) {
            return Err(MemxError::Validation(
                "content has no scorable terms".to_string(),
            ));
        }
        Ok(embedding)
    }

    /// Frequency prior for `content` against the current graph.
    pub fn familiarity(&self, graph: &KnowledgeGraph, content: &str) -> MemxResult<f32> {
        let saturation = self.config.frequency_saturation;
        let extraction = self.extractor.extract(content)?;
        let degrees: Vec<f32> = extraction
            .named_entities()
            .filter_map(|e| graph.find_by_label(&e.label))
            .map(|node| graph.in_degree(node.id) as f32)
            .collect();
        if degrees.is_empty() {
            return Ok(0.0);
        }
        let sum: f32 = degrees.iter().map(|d| d / (d + saturation)).sum();
        Ok(sum / degrees.len() as f32)
    }

    /// Score a candidate against `log`, the locked state of its conversation.
    pub fn score(
        &self,
        embedding: &[f32],
        log: &ConversationLog,
        familiarity: f32,
    ) -> SurpriseBreakdown {
        let neighbors = self
            .index
            .nearest(embedding, Some(log.conversation_id()), self.config.top_k);

        let next_seq = log.len() as u64;
        let mut max_similarity: f32 = 0.0;
        let mut compared = 0;
        for neighbor in &neighbors {
            let Some(prior) = interaction_id_from_key(&neighbor.key).and_then(|id| log.get(id)) else {
                continue;
            };
            compared += 1;
            let age = next_seq.saturating_sub(prior.seq) as f32;
            let effective = neighbor.similarity.max(0.0) * self.recency_discount(age);
            max_similarity = max_similarity.max(effective);
        }

        if compared == 0 {
            return SurpriseBreakdown {
                score: 1.0,
                max_similarity: 0.0,
                familiarity,
                neighbors: 0,
            };
        }

        let base = 1.0 - max_similarity;
        let prior = 1.0 - self.config.frequency_weight * familiarity;
        SurpriseBreakdown {
            score: (base * prior).clamp(0.0, 1.0),
            max_similarity,
            familiarity,
            neighbors: compared,
        }
    }

    fn recency_discount(&self, age: f32) -> f32 {
        let half_life = self.config.recency_half_life.max(f32::MIN_POSITIVE);
        let faded = 1.0 - (-age / half_life).exp2();
        1.0 - self.config.recency_weight * faded
    }
}
