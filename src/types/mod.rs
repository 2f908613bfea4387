//! All data types for the memx library.

pub mod error;
pub mod interaction;
pub mod knowledge;
pub mod session;

pub use error::{MemxError, MemxResult};
pub use interaction::{Interaction, InteractionStatus, NewInteraction, Role};
pub use knowledge::{KnowledgeEdge, KnowledgeNode, NodeRef};
pub use session::{ConversationSession, SessionStatus};

/// Globally unique interaction identifier (assigned sequentially).
pub type InteractionId = u64;

/// Knowledge graph node identifier.
pub type NodeId = u64;

/// Knowledge graph edge identifier.
pub type EdgeId = u64;

/// Maximum content size per interaction: 64KB.
pub const MAX_CONTENT_SIZE: usize = 65_536;

/// Maximum length of a knowledge node label.
pub const MAX_LABEL_LEN: usize = 256;

/// Upper bound on traversal depth accepted from callers.
pub const MAX_TRAVERSAL_HOPS: u32 = 16;

/// Default traversal depth when the caller does not supply one.
pub const DEFAULT_TRAVERSAL_HOPS: u32 = 3;

/// Microseconds per second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Returns the current time as Unix epoch microseconds.
pub fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros() as u64
}

/// Render a microsecond timestamp as RFC 3339 (UTC).
pub fn format_micros(ts: u64) -> String {
    chrono::DateTime::from_timestamp_micros(ts as i64)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| ts.to_string())
}
