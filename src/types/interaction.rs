//! Interaction types: the atomic unit of episodic memory.

use serde::{Deserialize, Serialize};

use super::{now_micros, InteractionId, MAX_CONTENT_SIZE};
use crate::types::error::{MemxError, MemxResult};

/// Who produced an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human (or calling agent) side of the exchange.
    User,
    /// The agent's own output.
    Assistant,
    /// Engine-generated records such as asserted knowledge.
    System,
    /// Output captured from a tool invocation.
    Tool,
}

impl Role {
    /// Return a human-readable name for this role.
    pub fn name(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    /// Parse a role from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "user" | "human" => Some(Self::User),
            "assistant" | "agent" | "ai" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle status of an interaction.
///
/// `Raw` is the only non-terminal status; every other status is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Raw,
    Summarized,
    Pruned,
    Promoted,
}

impl InteractionStatus {
    /// Return a human-readable name for this status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Summarized => "summarized",
            Self::Pruned => "pruned",
            Self::Promoted => "promoted",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Raw)
    }

    /// Monotonic transition rule: `raw -> {summarized|pruned|promoted}`.
    pub fn can_transition_to(&self, next: InteractionStatus) -> bool {
        matches!(self, Self::Raw) && next.is_terminal()
    }
}

impl std::fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single recorded interaction, owned by exactly one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Unique identifier across all conversations.
    pub id: InteractionId,
    /// Owning conversation.
    pub conversation_id: String,
    /// Project key the conversation belonged to when this was written.
    pub project_key: String,
    /// Position within the conversation (0-based insertion order).
    pub seq: u64,
    /// Who produced it.
    pub role: Role,
    /// Text content. Emptied when the interaction is pruned.
    pub content: String,
    /// Key of this interaction's vector in the nearest-neighbor index.
    pub embedding_ref: Option<String>,
    /// When it was appended (Unix epoch microseconds).
    pub timestamp: u64,
    /// Novelty relative to prior memory, in [0.0, 1.0].
    pub surprise_score: f32,
    /// Lifecycle status.
    pub status: InteractionStatus,
}

impl Interaction {
    /// Age in microseconds relative to `now`.
    pub fn age_micros(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// An interaction that has not yet been assigned an id or position.
#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub surprise_score: f32,
    pub timestamp: Option<u64>,
}

impl NewInteraction {
    /// Create a new interaction with the required fields.
    pub fn new(conversation_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            surprise_score: 1.0,
            timestamp: None,
        }
    }

    /// Set the surprise score (clamped to [0.0, 1.0]).
    pub fn surprise_score(mut self, score: f32) -> Self {
        self.surprise_score = score.clamp(0.0, 1.0);
        self
    }

    /// Set an explicit timestamp.
    pub fn timestamp(mut self, ts: u64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Validate content before it is written.
    pub fn validate(&self) -> MemxResult<()> {
        validate_content(&self.content)?;
        if self.surprise_score.is_nan() {
            return Err(MemxError::Validation("surprise score is NaN".to_string()));
        }
        Ok(())
    }

    /// Resolve the timestamp, defaulting to now.
    pub(crate) fn resolved_timestamp(&self) -> u64 {
        self.timestamp.unwrap_or_else(now_micros)
    }
}

/// Reject empty, whitespace-only or oversized content.
pub fn validate_content(content: &str) -> MemxResult<()> {
    if content.trim().is_empty() {
        return Err(MemxError::Validation(
            "content must not be empty".to_string(),
        ));
    }
    if content.len() > MAX_CONTENT_SIZE {
        return Err(MemxError::Validation(format!(
            "content exceeds maximum size: {} > {}",
            content.len(),
            MAX_CONTENT_SIZE
        )));
    }
    Ok(())
}
