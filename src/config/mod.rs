//! Engine configuration: scorer tunables, consolidation policy, retrieval,
//! activity reporting and external log sources.

pub mod loader;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{MemxError, MemxResult, MAX_TRAVERSAL_HOPS};

pub use loader::{load_config, resolve_config, resolve_root_dir};

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory holding all persisted state.
    #[serde(default = "loader::default_root_dir")]
    pub root_dir: PathBuf,
    /// Overrides the project context derived from the working directory.
    #[serde(default)]
    pub project_key: Option<String>,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl EngineConfig {
    /// Default configuration rooted at `root_dir`.
    pub fn for_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            project_key: None,
            scorer: ScorerConfig::default(),
            consolidation: ConsolidationConfig::default(),
            retrieval: RetrievalConfig::default(),
            activity: ActivityConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }

    /// Set the consolidation policy.
    pub fn with_policy(mut self, policy: ConsolidationPolicy) -> Self {
        self.consolidation.policy = Some(policy);
        self
    }

    /// Set the project context override.
    pub fn with_project_key(mut self, key: impl Into<String>) -> Self {
        self.project_key = Some(key.into());
        self
    }

    /// Check every section for out-of-range values.
    pub fn validate(&self) -> MemxResult<()> {
        self.scorer.validate()?;
        if let Some(policy) = &self.consolidation.policy {
            policy.validate()?;
        }
        match self.consolidation.schedule_interval_secs {
            Some(0) => {
                return Err(MemxError::Validation(
                    "schedule_interval_secs must be positive".to_string(),
                ))
            }
            Some(_) if self.consolidation.policy.is_none() => {
                return Err(MemxError::Validation(
                    "scheduled consolidation requires [consolidation.policy]".to_string(),
                ))
            }
            _ => {}
        }
        self.retrieval.validate()?;
        if self.embedding.dimension == 0 {
            return Err(MemxError::Validation(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Surprise scorer tunables. Recency decay and frequency prior are weighted
/// independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Nearest neighbors consulted per score.
    pub top_k: usize,
    /// How much novelty an old near-duplicate can recover (0 = none).
    pub recency_weight: f32,
    /// Interactions after which a near-duplicate's discount is halfway recovered.
    pub recency_half_life: f32,
    /// How strongly well-established entities suppress the score.
    pub frequency_weight: f32,
    /// In-degree at which an entity counts as half familiar.
    pub frequency_saturation: f32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            recency_weight: 0.5,
            recency_half_life: 50.0,
            frequency_weight: 0.3,
            frequency_saturation: 4.0,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> MemxResult<()> {
        if self.top_k == 0 {
            return Err(MemxError::Validation("scorer.top_k must be positive".into()));
        }
        for (name, value) in [
            ("recency_weight", self.recency_weight),
            ("frequency_weight", self.frequency_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MemxError::Validation(format!(
                    "scorer.{name} out of range [0.0, 1.0]: {value}"
                )));
            }
        }
        if self.recency_half_life <= 0.0 || self.frequency_saturation <= 0.0 {
            return Err(MemxError::Validation(
                "scorer half-life and saturation must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Thresholds and retention ages for the sleep cycle. No `Default`: a policy
/// must always be configured or passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationPolicy {
    /// Scores at or above this are promoted into the knowledge graph.
    pub t_high: f32,
    /// Scores below this are summarized or pruned once old enough.
    pub t_low: f32,
    /// Minimum age before a low-surprise interaction is summarized.
    pub retention_age_secs: u64,
    /// Age after which any non-promoted interaction is pruned.
    pub prune_age_secs: u64,
}

impl ConsolidationPolicy {
    pub fn validate(&self) -> MemxResult<()> {
        if !(0.0..=1.0).contains(&self.t_low) || !(0.0..=1.0).contains(&self.t_high) {
            return Err(MemxError::Validation(format!(
                "thresholds must lie in [0.0, 1.0]: t_low={}, t_high={}",
                self.t_low, self.t_high
            )));
        }
        if self.t_low >= self.t_high {
            return Err(MemxError::Validation(format!(
                "t_high ({}) must be greater than t_low ({})",
                self.t_high, self.t_low
            )));
        }
        if self.retention_age_secs > self.prune_age_secs {
            return Err(MemxError::Validation(format!(
                "retention_age_secs ({}) must not exceed prune_age_secs ({})",
                self.retention_age_secs, self.prune_age_secs
            )));
        }
        Ok(())
    }
}

/// Consolidation section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub policy: Option<ConsolidationPolicy>,
    /// When set, a background sleep cycle runs over all conversations.
    pub schedule_interval_secs: Option<u64>,
}

/// Retrieval section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    /// Hops explored from entities named in the query.
    pub graph_hops: u32,
    pub min_edge_weight: f32,
}

impl RetrievalConfig {
    pub fn validate(&self) -> MemxResult<()> {
        if self.default_top_k == 0 {
            return Err(MemxError::Validation(
                "retrieval.default_top_k must be positive".to_string(),
            ));
        }
        if self.graph_hops == 0 || self.graph_hops > MAX_TRAVERSAL_HOPS {
            return Err(MemxError::Validation(format!(
                "retrieval.graph_hops must be between 1 and {MAX_TRAVERSAL_HOPS}"
            )));
        }
        if !(0.0..=1.0).contains(&self.min_edge_weight) {
            return Err(MemxError::Validation(
                "retrieval.min_edge_weight must lie in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            graph_hops: 2,
            min_edge_weight: 0.0,
        }
    }
}

/// Activity report section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub max_items_per_project: usize,
    pub snippet_chars: usize,
    pub external_sources: Vec<ExternalSource>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            max_items_per_project: 5,
            snippet_chars: 100,
            external_sources: Vec::new(),
        }
    }
}

/// Format of an external activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jsonl,
    Json,
    Text,
}

/// Another agent's log, read-only, merged into activity reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSource {
    pub name: String,
    /// A file, or a directory whose regular files are all read.
    pub path: PathBuf,
    pub format: SourceFormat,
    /// Field name -> dotted path in each record (`timestamp`, `role`, `content`, `project`).
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

/// Embedding section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimension: 256 }
    }
}
