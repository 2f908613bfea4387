//! Consolidation checkpoints: how far a conversation has been settled.

use serde::{Deserialize, Serialize};

use crate::types::Interaction;

/// Per-conversation consolidation bookmark.
///
/// `watermark` is one past the longest prefix of interactions that all carry a
/// terminal status, so everything below it is never selected again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationCheckpoint {
    /// Sequence number of the first interaction not yet settled.
    pub watermark: u64,
    /// Latest interaction timestamp processed by a committed batch.
    pub last_timestamp: u64,
    /// When the last batch committed (Unix epoch microseconds).
    pub last_run_at: u64,
}

impl ConversationCheckpoint {
    /// Advance the watermark over every leading terminal interaction.
    /// Never moves backwards.
    pub fn advance(&mut self, interactions: &[Interaction]) {
        let mut w = self.watermark as usize;
        while w < interactions.len() && interactions[w].status.is_terminal() {
            w += 1;
        }
        self.watermark = self.watermark.max(w as u64);
    }
}
