//! Session registry: maps a normalized project key to its single active
//! conversation and keeps every archived one.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::fsio::{read_json_opt, write_json_atomic};
use super::layout::StoreLayout;
use crate::sync::{read, write};
use crate::types::{now_micros, ConversationSession, MemxError, MemxResult, SessionStatus};

/// Sessions of one project key. At most one is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub active: Option<ConversationSession>,
    #[serde(default)]
    pub history: Vec<ConversationSession>,
}

impl ProjectEntry {
    /// Most recent activity across active and archived sessions.
    pub fn last_active_at(&self) -> u64 {
        self.active
            .iter()
            .chain(self.history.iter())
            .map(|s| s.last_active_at)
            .max()
            .unwrap_or(0)
    }

    /// Every conversation id, active first.
    pub fn conversation_ids(&self) -> Vec<String> {
        self.active
            .iter()
            .chain(self.history.iter().rev())
            .map(|s| s.conversation_id.clone())
            .collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    projects: BTreeMap<String, ProjectEntry>,
}

/// Outcome of [`SessionRegistry::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConversation {
    pub conversation_id: String,
    pub project_key: String,
    /// Whether this call created the session.
    pub created: bool,
}

/// Process-wide, persisted project -> conversation mapping.
pub struct SessionRegistry {
    path: PathBuf,
    state: RwLock<RegistryState>,
    /// conversation_id -> project_key, rebuilt at load.
    owners: RwLock<HashMap<String, String>>,
    /// `last_active_at` updates not yet written.
    dirty: AtomicBool,
}

impl SessionRegistry {
    pub fn open(layout: &StoreLayout) -> MemxResult<Self> {
        let path = layout.registry_path();
        let state: RegistryState = read_json_opt(&path)?.unwrap_or_default();
        let mut owners = HashMap::new();
        for (key, entry) in &state.projects {
            for session in entry.active.iter().chain(entry.history.iter()) {
                owners.insert(session.conversation_id.clone(), key.clone());
            }
        }
        log::debug!("loaded registry with {} projects", state.projects.len());
        Ok(Self {
            path,
            state: RwLock::new(state),
            owners: RwLock::new(owners),
            dirty: AtomicBool::new(false),
        })
    }

    /// Return the active conversation for `project_key`, creating one if the
    /// key has none. Creation is a compare-and-create under the write lock:
    /// a caller that loses the race re-reads and returns the winner's id.
    pub fn resolve(&self, project_key: &str) -> MemxResult<ResolvedConversation> {
        let key = normalize_project_key(project_key)?;

        if let Some(active) = self.active_id(&key) {
            return Ok(ResolvedConversation {
                conversation_id: active,
                project_key: key,
                created: false,
            });
        }

        let mut state = write(&self.state);
        let entry = state.projects.get(&key).cloned();
        if let Some(active) = entry.as_ref().and_then(|e| e.active.as_ref()) {
            return Ok(ResolvedConversation {
                conversation_id: active.conversation_id.clone(),
                project_key: key,
                created: false,
            });
        }

        let session = ConversationSession::new(new_conversation_id(), key.clone(), now_micros());
        let conversation_id = session.conversation_id.clone();
        let mut updated = entry.clone().unwrap_or_default();
        updated.active = Some(session);
        self.commit(&mut state, &key, updated, entry)?;
        write(&self.owners).insert(conversation_id.clone(), key.clone());

        log::info!("created conversation {conversation_id} for project {key}");
        Ok(ResolvedConversation {
            conversation_id,
            project_key: key,
            created: true,
        })
    }

    /// Archive the active session for `project_key` (if any) and start a fresh one.
    pub fn start_new(&self, project_key: &str) -> MemxResult<ResolvedConversation> {
        let key = normalize_project_key(project_key)?;
        let now = now_micros();

        let mut state = write(&self.state);
        let previous = state.projects.get(&key).cloned();
        let mut updated = previous.clone().unwrap_or_default();
        if let Some(mut old) = updated.active.take() {
            old.status = SessionStatus::Archived;
            log::info!(
                "archived conversation {} for project {key}",
                old.conversation_id
            );
            updated.history.push(old);
        }
        let session = ConversationSession::new(new_conversation_id(), key.clone(), now);
        let conversation_id = session.conversation_id.clone();
        updated.active = Some(session);
        self.commit(&mut state, &key, updated, previous)?;
        write(&self.owners).insert(conversation_id.clone(), key.clone());

        Ok(ResolvedConversation {
            conversation_id,
            project_key: key,
            created: true,
        })
    }

    /// Install `updated` for `key` and persist; restore `previous` if the write fails.
    fn commit(
        &self,
        state: &mut RegistryState,
        key: &str,
        updated: ProjectEntry,
        previous: Option<ProjectEntry>,
    ) -> MemxResult<()> {
        state.projects.insert(key.to_string(), updated);
        if let Err(e) = write_json_atomic(&self.path, &*state) {
            match previous {
                Some(prev) => state.projects.insert(key.to_string(), prev),
                None => state.projects.remove(key),
            };
            return Err(e);
        }
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn active_id(&self, key: &str) -> Option<String> {
        read(&self.state)
            .projects
            .get(key)
            .and_then(|e| e.active.as_ref())
            .map(|s| s.conversation_id.clone())
    }

    /// Active session for a project key, if any.
    pub fn active_session(&self, project_key: &str) -> MemxResult<Option<ConversationSession>> {
        let key = normalize_project_key(project_key)?;
        Ok(read(&self.state)
            .projects
            .get(&key)
            .and_then(|e| e.active.clone()))
    }

    /// Find a session by conversation id, active or archived.
    pub fn session(&self, conversation_id: &str) -> Option<ConversationSession> {
        let key = read(&self.owners).get(conversation_id).cloned()?;
        let state = read(&self.state);
        let entry = state.projects.get(&key)?;
        entry
            .active
            .iter()
            .chain(entry.history.iter())
            .find(|s| s.conversation_id == conversation_id)
            .cloned()
    }

    /// Project key owning a conversation.
    pub fn project_of(&self, conversation_id: &str) -> Option<String> {
        read(&self.owners).get(conversation_id).cloned()
    }

    /// Snapshot of every project entry, ordered by key.
    pub fn projects(&self) -> Vec<(String, ProjectEntry)> {
        read(&self.state)
            .projects
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Record activity on a conversation. Persisted on the next [`flush`](Self::flush).
    pub fn touch(&self, conversation_id: &str, at: u64) {
        let Some(key) = self.project_of(conversation_id) else {
            return;
        };
        let mut state = write(&self.state);
        if let Some(entry) = state.projects.get_mut(&key) {
            for session in entry.active.iter_mut().chain(entry.history.iter_mut()) {
                if session.conversation_id == conversation_id && session.last_active_at < at {
                    session.last_active_at = at;
                    self.dirty.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    /// Write pending `last_active_at` updates.
    pub fn flush(&self) -> MemxResult<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let state = read(&self.state);
        if let Err(e) = write_json_atomic(&self.path, &*state) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }
}

/// Normalize a working-context identity into a project key.
///
/// Existing paths are canonicalized; others are made absolute against the
/// current directory and cleaned lexically. No prefix or ancestor matching is
/// ever applied: a subdirectory is its own project.
pub fn normalize_project_key(raw: &str) -> MemxResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MemxError::Validation(
            "project key must not be empty".to_string(),
        ));
    }
    let path = Path::new(trimmed);
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical.display().to_string());
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Ok(cleaned.display().to_string())
}

fn new_conversation_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "conv_{}_{}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S"),
        &uuid[..8]
    )
}
