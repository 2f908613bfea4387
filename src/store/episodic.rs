//! Episodic tier: an append-only, insertion-ordered interaction log per
//! conversation.
//!
//! Each conversation lives in `episodes/<conversation_id>.jsonl`. Appends add an
//! `append` record; status transitions add a `mark` record. Consolidation
//! commits rewrite the whole file atomically so statuses, the rolling digest and
//! the checkpoint land together, and pruned content is physically discarded.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::checkpoint::ConversationCheckpoint;
use super::fsio::{append_json_line, read_json_lines, repair_json_lines, write_atomic};
use super::layout::StoreLayout;
use crate::sync::{lock, read, write};
use crate::types::{
    Interaction, InteractionId, InteractionStatus, MemxError, MemxResult, NewInteraction,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogRecord {
    Meta {
        project_key: String,
        checkpoint: ConversationCheckpoint,
        #[serde(default)]
        digest: String,
    },
    Append {
        interaction: Interaction,
    },
    Mark {
        id: InteractionId,
        status: InteractionStatus,
    },
}

/// A requested status transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusChange {
    pub id: InteractionId,
    pub status: InteractionStatus,
}

/// Bookkeeping for a consolidation batch being committed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BatchRun {
    /// Latest interaction timestamp the batch looked at.
    pub processed_up_to: u64,
    pub committed_at: u64,
}

/// All interactions of one conversation plus its consolidation bookkeeping.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    conversation_id: String,
    project_key: String,
    path: PathBuf,
    interactions: Vec<Interaction>,
    checkpoint: ConversationCheckpoint,
    digest: String,
    /// Whether the file already starts with a meta record.
    has_meta: bool,
}

impl ConversationLog {
    fn new(conversation_id: String, project_key: String, path: PathBuf) -> Self {
        Self {
            conversation_id,
            project_key,
            path,
            interactions: Vec::new(),
            checkpoint: ConversationCheckpoint::default(),
            digest: String::new(),
            has_meta: false,
        }
    }

    fn load(conversation_id: String, path: PathBuf) -> MemxResult<Self> {
        repair_json_lines(&path)?;
        let records: Vec<LogRecord> = read_json_lines(&path)?;
        let mut log = Self::new(conversation_id, String::new(), path);
        for record in records {
            match record {
                LogRecord::Meta {
                    project_key,
                    checkpoint,
                    digest,
                } => {
                    log.project_key = project_key;
                    log.checkpoint = checkpoint;
                    log.digest = digest;
                    log.has_meta = true;
                }
                LogRecord::Append { mut interaction } => {
                    interaction.seq = log.interactions.len() as u64;
                    if log.project_key.is_empty() {
                        log.project_key = interaction.project_key.clone();
                    }
                    log.interactions.push(interaction);
                }
                LogRecord::Mark { id, status } => {
                    if let Err(e) = log.apply_status(id, status) {
                        log::warn!("ignoring mark record in {}: {e}", log.path.display());
                    }
                }
            }
        }
        Ok(log)
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    /// Interactions in insertion order.
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn checkpoint(&self) -> ConversationCheckpoint {
        self.checkpoint
    }

    /// Rolling summary of everything summarized so far.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub fn get(&self, id: InteractionId) -> Option<&Interaction> {
        self.position(id).map(|i| &self.interactions[i])
    }

    /// Raw interactions past the checkpoint watermark.
    pub fn pending(&self) -> Vec<Interaction> {
        let start = (self.checkpoint.watermark as usize).min(self.interactions.len());
        self.interactions[start..]
            .iter()
            .filter(|i| i.status == InteractionStatus::Raw)
            .cloned()
            .collect()
    }

    /// The last `window` interactions, oldest first.
    pub fn recent(&self, window: usize) -> &[Interaction] {
        let start = self.interactions.len().saturating_sub(window);
        &self.interactions[start..]
    }

    fn position(&self, id: InteractionId) -> Option<usize> {
        // ids grow with seq inside a conversation
        self.interactions
            .binary_search_by_key(&id, |i| i.id)
            .ok()
            .or_else(|| self.interactions.iter().position(|i| i.id == id))
    }

    fn apply_status(&mut self, id: InteractionId, status: InteractionStatus) -> MemxResult<()> {
        let pos = self
            .position(id)
            .ok_or_else(|| MemxError::not_found("interaction", id))?;
        let interaction = &mut self.interactions[pos];
        if !interaction.status.can_transition_to(status) {
            return Err(MemxError::InvalidTransition {
                id,
                from: interaction.status,
                to: status,
            });
        }
        interaction.status = status;
        if status == InteractionStatus::Pruned {
            interaction.content.clear();
            interaction.embedding_ref = None;
        }
        Ok(())
    }

    fn meta_record(&self) -> LogRecord {
        LogRecord::Meta {
            project_key: self.project_key.clone(),
            checkpoint: self.checkpoint,
            digest: self.digest.clone(),
        }
    }

    /// Rewrite the whole file from in-memory state.
    fn persist_full(&self) -> MemxResult<()> {
        let mut buf = Vec::new();
        let mut push = |record: &LogRecord| -> MemxResult<()> {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
            Ok(())
        };
        push(&self.meta_record())?;
        for interaction in &self.interactions {
            push(&LogRecord::Append {
                interaction: interaction.clone(),
            })?;
        }
        write_atomic(&self.path, &buf)?;
        Ok(())
    }

    /// Apply a batch of transitions, replace the digest and checkpoint, and
    /// commit everything with one atomic rewrite. On any failure `self` is
    /// left exactly as it was.
    pub(crate) fn commit_batch(
        &mut self,
        changes: &[StatusChange],
        digest: Option<String>,
        run: Option<BatchRun>,
    ) -> MemxResult<()> {
        let mut staged = self.clone();
        for change in changes {
            staged.apply_status(change.id, change.status)?;
        }
        if let Some(digest) = digest {
            staged.digest = digest;
        }
        staged.checkpoint.advance(&staged.interactions);
        if let Some(run) = run {
            staged.checkpoint.last_timestamp =
                staged.checkpoint.last_timestamp.max(run.processed_up_to);
            staged.checkpoint.last_run_at = run.committed_at;
        }
        staged.has_meta = true;
        staged.persist_full()?;
        *self = staged;
        Ok(())
    }
}

/// All conversation logs, each behind its own lock so appends to different
/// conversations never contend and appends within one are linearized.
pub struct EpisodicStore {
    layout: StoreLayout,
    logs: RwLock<HashMap<String, Arc<Mutex<ConversationLog>>>>,
    owners: RwLock<HashMap<InteractionId, String>>,
    next_id: AtomicU64,
}

impl EpisodicStore {
    /// Load every conversation log under the layout's episodes directory.
    pub fn open(layout: StoreLayout) -> MemxResult<Self> {
        let mut logs = HashMap::new();
        let mut owners = HashMap::new();
        let mut max_id: Option<u64> = None;

        for entry in std::fs::read_dir(layout.episodes_dir())? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }
            let Some(conversation_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let log = ConversationLog::load(conversation_id.to_string(), path.clone())?;
            for interaction in log.interactions() {
                owners.insert(interaction.id, conversation_id.to_string());
                max_id = Some(max_id.map_or(interaction.id, |m| m.max(interaction.id)));
            }
            logs.insert(conversation_id.to_string(), Arc::new(Mutex::new(log)));
        }

        log::debug!("loaded {} episodic logs", logs.len());
        Ok(Self {
            layout,
            logs: RwLock::new(logs),
            owners: RwLock::new(owners),
            next_id: AtomicU64::new(max_id.map_or(0, |m| m + 1)),
        })
    }

    /// Register a conversation so it can receive appends. No-op if known.
    pub fn ensure_conversation(&self, conversation_id: &str, project_key: &str) -> MemxResult<()> {
        if read(&self.logs).contains_key(conversation_id) {
            return Ok(());
        }
        let path = self.layout.episode_log(conversation_id)?;
        write(&self.logs)
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationLog::new(
                    conversation_id.to_string(),
                    project_key.to_string(),
                    path,
                )))
            });
        Ok(())
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        read(&self.logs).contains_key(conversation_id)
    }

    /// Handle to one conversation's log.
    pub fn log(&self, conversation_id: &str) -> MemxResult<Arc<Mutex<ConversationLog>>> {
        read(&self.logs)
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| MemxError::not_found("conversation", conversation_id))
    }

    /// All known conversation ids, sorted.
    pub fn conversation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = read(&self.logs).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Append a new interaction: the only write path that creates one.
    pub fn append(&self, new: NewInteraction) -> MemxResult<Interaction> {
        let score = new.surprise_score;
        self.append_scored(new, |_| Ok(score), |_| {})
    }

    /// Append with the score computed under the conversation lock, so two
    /// concurrent appends never score against the same prior state. `appended`
    /// runs before the lock is released.
    pub fn append_scored(
        &self,
        new: NewInteraction,
        score: impl FnOnce(&ConversationLog) -> MemxResult<f32>,
        appended: impl FnOnce(&Interaction),
    ) -> MemxResult<Interaction> {
        new.validate()?;
        let handle = self.log(&new.conversation_id)?;
        let mut log = lock(&handle);

        let surprise_score = score(&log)?.clamp(0.0, 1.0);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let interaction = Interaction {
            id,
            conversation_id: new.conversation_id.clone(),
            project_key: log.project_key.clone(),
            seq: log.interactions.len() as u64,
            role: new.role,
            embedding_ref: Some(embedding_key(id)),
            timestamp: new.resolved_timestamp(),
            surprise_score,
            status: InteractionStatus::Raw,
            content: new.content,
        };

        if !log.has_meta {
            append_json_line(&log.path, &log.meta_record())?;
            log.has_meta = true;
        }
        append_json_line(
            &log.path,
            &LogRecord::Append {
                interaction: interaction.clone(),
            },
        )?;
        log.interactions.push(interaction.clone());
        appended(&interaction);
        drop(log);

        write(&self.owners).insert(id, interaction.conversation_id.clone());
        log::debug!(
            "appended interaction {} to {} (seq {}, surprise {:.3})",
            id,
            interaction.conversation_id,
            interaction.seq,
            interaction.surprise_score
        );
        Ok(interaction)
    }

    /// The last `window` interactions of a conversation, oldest first.
    pub fn recent(&self, conversation_id: &str, window: usize) -> MemxResult<Vec<Interaction>> {
        let handle = self.log(conversation_id)?;
        let log = lock(&handle);
        Ok(log.recent(window).to_vec())
    }

    /// Every interaction of a conversation, oldest first.
    pub fn interactions(&self, conversation_id: &str) -> MemxResult<Vec<Interaction>> {
        let handle = self.log(conversation_id)?;
        let log = lock(&handle);
        Ok(log.interactions().to_vec())
    }

    /// Look up any interaction by id.
    pub fn get(&self, id: InteractionId) -> MemxResult<Interaction> {
        let owner = read(&self.owners)
            .get(&id)
            .cloned()
            .ok_or_else(|| MemxError::not_found("interaction", id))?;
        let handle = self.log(&owner)?;
        let log = lock(&handle);
        log.get(id)
            .cloned()
            .ok_or_else(|| MemxError::not_found("interaction", id))
    }

    /// Transition one interaction's status; only `raw -> terminal` is allowed.
    pub fn mark(&self, id: InteractionId, status: InteractionStatus) -> MemxResult<()> {
        let owner = read(&self.owners)
            .get(&id)
            .cloned()
            .ok_or_else(|| MemxError::not_found("interaction", id))?;
        let handle = self.log(&owner)?;
        let mut log = lock(&handle);

        let current = log
            .get(id)
            .map(|i| i.status)
            .ok_or_else(|| MemxError::not_found("interaction", id))?;
        if !current.can_transition_to(status) {
            return Err(MemxError::InvalidTransition {
                id,
                from: current,
                to: status,
            });
        }

        if status == InteractionStatus::Pruned {
            // content must not survive on disk
            log.commit_batch(&[StatusChange { id, status }], None, None)
        } else {
            append_json_line(&log.path, &LogRecord::Mark { id, status })?;
            log.apply_status(id, status)
        }
    }
}

/// Key under which an interaction's vector is stored in the nearest-neighbor index.
pub fn embedding_key(id: InteractionId) -> String {
    format!("interaction:{id}")
}

/// Inverse of [`embedding_key`].
pub fn interaction_id_from_key(key: &str) -> Option<InteractionId> {
    key.strip_prefix("interaction:")?.parse().ok()
}
