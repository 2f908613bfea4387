//! Auto-ingest gate consulted before retrieval/response paths log anything.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::store::fsio::{read_json_opt, write_json_atomic};
use crate::store::StoreLayout;
use crate::sync::lock;
use crate::types::{now_micros, MemxResult};

/// What an automatic log entry would record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestKind {
    Query,
    Response,
}

/// Per-project switches. `None` defers to the global setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_queries: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_responses: Option<bool>,
}

impl ProjectOverride {
    fn for_kind(&self, kind: IngestKind) -> Option<bool> {
        match kind {
            IngestKind::Query => self.log_queries,
            IngestKind::Response => self.log_responses,
        }
    }
}

/// Persisted auto-ingest configuration (`auto_ingest.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoIngestConfig {
    /// `None` means never configured, which behaves as disabled.
    #[serde(default)]
    pub global_enabled: Option<bool>,
    #[serde(default)]
    pub per_project_overrides: BTreeMap<String, ProjectOverride>,
    /// Unix epoch microseconds of the last change, 0 if never changed.
    #[serde(default)]
    pub updated_at: u64,
}

impl AutoIngestConfig {
    /// Resolution order: project override, then global, then disabled.
    pub fn should_log(&self, project_key: &str, kind: IngestKind) -> bool {
        self.per_project_overrides
            .get(project_key)
            .and_then(|o| o.for_kind(kind))
            .or(self.global_enabled)
            .unwrap_or(false)
    }
}

/// Effective settings for one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoIngestStatus {
    pub project_key: String,
    pub log_queries: bool,
    pub log_responses: bool,
    pub global_enabled: Option<bool>,
    pub project_override: Option<ProjectOverride>,
    pub updated_at: u64,
}

/// Reads the configuration from disk on every decision, so changes made
/// by another process take effect without a restart.
pub struct AutoIngestController {
    path: PathBuf,
    /// Serializes read-modify-write in `configure`.
    write_lock: Mutex<()>,
}

impl AutoIngestController {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            path: layout.auto_ingest_path(),
            write_lock: Mutex::new(()),
        }
    }

    /// Current configuration; an absent file is the default (disabled).
    pub fn load(&self) -> MemxResult<AutoIngestConfig> {
        Ok(read_json_opt(&self.path)?.unwrap_or_default())
    }

    /// Whether an automatic log of `kind` should be written for `project_key`.
    /// Fails closed: an unreadable configuration means no logging.
    pub fn should_log(&self, project_key: &str, kind: IngestKind) -> bool {
        match self.load() {
            Ok(config) => config.should_log(project_key, kind),
            Err(e) => {
                log::warn!("Auto-ingest configuration unreadable, skipping log: {e}");
                false
            }
        }
    }

    pub fn status(&self, project_key: &str) -> MemxResult<AutoIngestStatus> {
        Ok(status_of(&self.load()?, project_key))
    }

    /// Update the global switch and/or the overrides for `project_key`.
    /// An unreadable file is replaced by a fresh configuration.
    pub fn configure(
        &self,
        project_key: &str,
        enabled: Option<bool>,
        log_queries: Option<bool>,
        log_responses: Option<bool>,
    ) -> MemxResult<AutoIngestStatus> {
        let _guard = lock(&self.write_lock);
        let mut config = self.load().unwrap_or_else(|e| {
            log::warn!("Replacing unreadable auto-ingest configuration: {e}");
            AutoIngestConfig::default()
        });

        if enabled.is_some() {
            config.global_enabled = enabled;
        }
        if log_queries.is_some() || log_responses.is_some() {
            let entry = config
                .per_project_overrides
                .entry(project_key.to_string())
                .or_default();
            if log_queries.is_some() {
                entry.log_queries = log_queries;
            }
            if log_responses.is_some() {
                entry.log_responses = log_responses;
            }
        }
        config.updated_at = now_micros();

        write_json_atomic(&self.path, &config)?;
        log::info!(
            "Auto-ingest updated for {project_key}: enabled={enabled:?} queries={log_queries:?} responses={log_responses:?}"
        );
        Ok(status_of(&config, project_key))
    }
}

fn status_of(config: &AutoIngestConfig, project_key: &str) -> AutoIngestStatus {
    AutoIngestStatus {
        project_key: project_key.to_string(),
        log_queries: config.should_log(project_key, IngestKind::Query),
        log_responses: config.should_log(project_key, IngestKind::Response),
        global_enabled: config.global_enabled,
        project_override: config.per_project_overrides.get(project_key).copied(),
        updated_at: config.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_order() {
        let mut config = AutoIngestConfig::default();
        assert!(!config.should_log("/p", IngestKind::Query));

        config.global_enabled = Some(true);
        assert!(config.should_log("/p", IngestKind::Query));

        config.per_project_overrides.insert(
            "/p".to_string(),
            ProjectOverride {
                log_queries: Some(false),
                log_responses: None,
            },
        );
        assert!(!config.should_log("/p", IngestKind::Query));
        assert!(config.should_log("/p", IngestKind::Response));
        assert!(config.should_log("/other", IngestKind::Query));
    }
}
