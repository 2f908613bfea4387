//! Error types for the memx library.

use thiserror::Error;

use super::InteractionStatus;

/// All errors that can occur in the memx library.
#[derive(Error, Debug)]
pub enum MemxError {
    /// Malformed or empty input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown conversation, node, edge, interaction or project.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A registry race was lost or a consolidation run is already in flight.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Underlying persistence I/O failure.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Persisted state could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Partial failure inside a consolidation batch; the batch was rolled back.
    #[error("Consolidation batch failed for {scope}: {reason}")]
    ConsolidationBatch { scope: String, reason: String },

    /// Status transition that would leave a terminal status or go backwards.
    #[error("Invalid status transition for interaction {id}: {from} -> {to}")]
    InvalidTransition {
        id: u64,
        from: InteractionStatus,
        to: InteractionStatus,
    },

    /// An embedding, extraction or other external service call failed.
    #[error("{service} service failed: {reason}")]
    Service {
        service: &'static str,
        reason: String,
    },

    /// A consolidation batch was cancelled before commit.
    #[error("Consolidation cancelled; batch rolled back")]
    Cancelled,

    /// The tool surface received an unknown tool name.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),
}

impl MemxError {
    /// Shorthand for a [`MemxError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`MemxError::Service`].
    pub fn service(service: &'static str, reason: impl ToString) -> Self {
        Self::Service {
            service,
            reason: reason.to_string(),
        }
    }

    /// Stable snake_case name of the error category, used in tool failures.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found_error",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::Storage(_) | Self::Serialization(_) => "storage_error",
            Self::ConsolidationBatch { .. } | Self::Cancelled => "consolidation_batch_error",
            Self::InvalidTransition { .. } => "invalid_transition_error",
            Self::Service { .. } => "service_error",
            Self::ToolNotFound(_) => "tool_not_found",
        }
    }
}

/// Convenience result type for memx operations.
pub type MemxResult<T> = Result<T, MemxError>;
