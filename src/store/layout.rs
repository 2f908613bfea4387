//! On-disk layout of the memx root directory.

use std::path::{Path, PathBuf};

use crate::types::{MemxError, MemxResult};

/// Paths of every persisted artifact under one root directory.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root and its subdirectories.
    pub fn ensure(&self) -> MemxResult<()> {
        std::fs::create_dir_all(self.episodes_dir())?;
        std::fs::create_dir_all(self.snapshots_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Held exclusively by the one engine that owns this root.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join("LOCK")
    }

    /// Project key -> conversation registry.
    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub fn episodes_dir(&self) -> PathBuf {
        self.root.join("episodes")
    }

    /// Episodic log for one conversation.
    pub fn episode_log(&self, conversation_id: &str) -> MemxResult<PathBuf> {
        validate_file_stem(conversation_id)?;
        Ok(self.episodes_dir().join(format!("{conversation_id}.jsonl")))
    }

    /// Shared knowledge graph.
    pub fn graph_path(&self) -> PathBuf {
        self.root.join("graph.json")
    }

    pub fn auto_ingest_path(&self) -> PathBuf {
        self.root.join("auto_ingest.json")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    pub fn snapshot_index_path(&self) -> PathBuf {
        self.snapshots_dir().join("index.jsonl")
    }

    /// Every state file that currently exists (for archival).
    pub fn state_files(&self) -> MemxResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = [
            self.registry_path(),
            self.graph_path(),
            self.auto_ingest_path(),
        ]
        .into_iter()
        .filter(|p| p.is_file())
        .collect();

        let mut episodes: Vec<PathBuf> = std::fs::read_dir(self.episodes_dir())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        episodes.sort();
        files.extend(episodes);
        Ok(files)
    }
}

/// Conversation ids become file names; only allow a safe alphabet.
fn validate_file_stem(stem: &str) -> MemxResult<()> {
    let ok = !stem.is_empty()
        && stem.len() <= 128
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(MemxError::Validation(format!(
            "invalid conversation id: {stem:?}"
        )))
    }
}
