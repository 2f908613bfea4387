//! Conversation sessions tracked by the session registry.

use serde::{Deserialize, Serialize};

/// Whether a session is the current one for its project key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Archived,
}

impl SessionStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One conversation bound to a project key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub conversation_id: String,
    pub project_key: String,
    /// Unix epoch microseconds.
    pub created_at: u64,
    /// Unix epoch microseconds of the latest append.
    pub last_active_at: u64,
    pub status: SessionStatus,
}

impl ConversationSession {
    /// Create a fresh active session.
    pub fn new(conversation_id: String, project_key: String, now: u64) -> Self {
        Self {
            conversation_id,
            project_key,
            created_at: now,
            last_active_at: now,
            status: SessionStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
